use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use async_trait::async_trait;
use mongodb::bson::{self, oid::ObjectId, Bson};
use serde::{de::DeserializeOwned, Serialize};

use crate::error;

use super::{Entity, Repository};

/// In-memory repository keeping documents in insertion order.
pub struct TestRepository<T> {
    _t: std::marker::PhantomData<T>,
    pub db: Mutex<Vec<Bson>>,
}

impl<T> Default for TestRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TestRepository<T> {
    pub fn new() -> Self {
        Self {
            _t: std::marker::PhantomData,
            db: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> error::Result<MutexGuard<'_, Vec<Bson>>> {
        self.db
            .lock()
            .map_err(|_| anyhow!("Test repository lock poisoned").into())
    }
}

fn field_of<'a>(item: &'a Bson, field: &str) -> Option<&'a Bson> {
    item.as_document().and_then(|doc| doc.get(field))
}

fn has_id(item: &Bson, id: &ObjectId) -> bool {
    field_of(item, "id") == Some(&Bson::ObjectId(*id))
}

fn decode<T: DeserializeOwned>(item: &Bson) -> error::Result<T> {
    Ok(bson::from_bson(item.clone())?)
}

#[async_trait]
impl<T> Repository<T> for TestRepository<T>
where
    T: Entity + Clone + Send + Sync + Serialize + DeserializeOwned,
{
    async fn insert(&self, item: &T) -> error::Result<bool> {
        let encoded = bson::to_bson(item)?;
        let mut db = self.lock()?;

        let id = item.id();
        let contains = db.iter().any(|x| has_id(x, &id));
        if !contains {
            db.push(encoded);
        }
        Ok(!contains)
    }

    async fn find(&self, field: &str, value: &Bson) -> error::Result<Option<T>> {
        let db = self.lock()?;
        db.iter()
            .find(|x| field_of(x, field) == Some(value))
            .map(decode)
            .transpose()
    }

    async fn delete(&self, field: &str, id: &ObjectId) -> error::Result<Option<T>> {
        let mut db = self.lock()?;
        let value = Bson::ObjectId(*id);
        let Some(pos) = db.iter().position(|x| field_of(x, field) == Some(&value)) else {
            return Ok(None);
        };
        let removed = db.remove(pos);
        decode(&removed).map(Some)
    }

    async fn update(&self, item: &T) -> error::Result<bool> {
        let encoded = bson::to_bson(item)?;
        let mut db = self.lock()?;

        let id = item.id();
        let Some(slot) = db.iter_mut().find(|x| has_id(x, &id)) else {
            return Ok(false);
        };
        *slot = encoded;
        Ok(true)
    }

    async fn find_all(&self, skip: u32, limit: u32) -> error::Result<Vec<T>> {
        let db = self.lock()?;
        db.iter()
            .skip(skip as usize)
            .take(limit as usize)
            .map(decode)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use mongodb::bson::Bson;

    use super::*;
    use crate::entities::letter::{OutgoingDraft, OutgoingLetter};

    fn letter(number: &str) -> OutgoingLetter<ObjectId> {
        OutgoingLetter::new(
            ObjectId::new(),
            OutgoingDraft {
                outgoing_number: number.to_string(),
                registration_date: NaiveDate::from_ymd_opt(2024, 1, 9).unwrap(),
                recipient: "ACME".to_string(),
                subject: "Test".to_string(),
                executor: "Ivanov".to_string(),
            },
            None,
        )
    }

    #[actix_web::test]
    async fn insert_is_unique_by_id() {
        let repo = TestRepository::new();
        let item = letter("1");
        assert!(repo.insert(&item).await.unwrap());
        assert!(!repo.insert(&item).await.unwrap());
        assert_eq!(repo.find_all(0, 100).await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn find_update_delete() {
        let repo = TestRepository::new();
        let mut item = letter("1");
        repo.insert(&item).await.unwrap();
        repo.insert(&letter("2")).await.unwrap();

        let found: Option<OutgoingLetter<ObjectId>> =
            repo.find("id", &Bson::ObjectId(item.id)).await.unwrap();
        assert_eq!(found.as_ref(), Some(&item));

        item.subject = "Changed".to_string();
        assert!(repo.update(&item).await.unwrap());
        assert!(!repo.update(&letter("3")).await.unwrap());

        let by_number: Option<OutgoingLetter<ObjectId>> = repo
            .find("outgoing_number", &Bson::String("1".to_string()))
            .await
            .unwrap();
        assert_eq!(by_number, Some(item.clone()));

        assert_eq!(repo.delete("id", &item.id).await.unwrap(), Some(item.clone()));
        assert_eq!(repo.delete("id", &item.id).await.unwrap(), None);
        assert_eq!(repo.find_all(0, 100).await.unwrap().len(), 1);
    }
}
