use std::{collections::HashMap, path::PathBuf};

use actix_web::web;
use anyhow::anyhow;
use chrono::NaiveDate;
use common::{
    context::Context,
    entities::letter::{
        parse_id, IncomingDraft, IncomingLetter, Letter, LetterKind, OutgoingDraft, OutgoingLetter,
    },
    error::{self, AddCode},
    repository::{Entity, RepositoryObject},
};
use mongodb::bson::{oid::ObjectId, Bson};
use serde::{de::DeserializeOwned, Serialize};

use super::{
    attachments::AttachmentStore,
    export,
    upload::{LetterPayload, Upload},
};

/// A stored letter of one kind.
pub trait StoredLetter:
    Entity + Into<Letter> + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Draft: Send;
    const KIND: LetterKind;

    fn draft(fields: &HashMap<String, String>) -> error::Result<Self::Draft>;
    fn from_draft(id: ObjectId, draft: Self::Draft, file_path: Option<String>) -> Self;
    fn merge(&mut self, fields: &HashMap<String, String>) -> error::Result<()>;
    fn registration_date(&self) -> NaiveDate;
    fn attachment(&self) -> Option<&str>;
    fn set_attachment(&mut self, file_path: Option<String>);
}

impl StoredLetter for OutgoingLetter<ObjectId> {
    type Draft = OutgoingDraft;
    const KIND: LetterKind = LetterKind::Outgoing;

    fn draft(fields: &HashMap<String, String>) -> error::Result<OutgoingDraft> {
        OutgoingDraft::from_fields(fields)
    }

    fn from_draft(id: ObjectId, draft: OutgoingDraft, file_path: Option<String>) -> Self {
        OutgoingLetter::new(id, draft, file_path)
    }

    fn merge(&mut self, fields: &HashMap<String, String>) -> error::Result<()> {
        self.apply_fields(fields)
    }

    fn registration_date(&self) -> NaiveDate {
        self.registration_date
    }

    fn attachment(&self) -> Option<&str> {
        self.file_path.as_deref()
    }

    fn set_attachment(&mut self, file_path: Option<String>) {
        self.file_path = file_path;
    }
}

impl StoredLetter for IncomingLetter<ObjectId> {
    type Draft = IncomingDraft;
    const KIND: LetterKind = LetterKind::Incoming;

    fn draft(fields: &HashMap<String, String>) -> error::Result<IncomingDraft> {
        IncomingDraft::from_fields(fields)
    }

    fn from_draft(id: ObjectId, draft: IncomingDraft, file_path: Option<String>) -> Self {
        IncomingLetter::new(id, draft, file_path)
    }

    fn merge(&mut self, fields: &HashMap<String, String>) -> error::Result<()> {
        self.apply_fields(fields)
    }

    fn registration_date(&self) -> NaiveDate {
        self.registration_date
    }

    fn attachment(&self) -> Option<&str> {
        self.file_path.as_deref()
    }

    fn set_attachment(&mut self, file_path: Option<String>) {
        self.file_path = file_path;
    }
}

fn not_found() -> error::ServiceError {
    anyhow!("Letter not found").code(404)
}

pub struct LetterService {
    context: Context,
}

impl LetterService {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    fn attachments(&self) -> error::Result<AttachmentStore> {
        self.context.try_get_repository_manual::<AttachmentStore>()
    }

    pub async fn list(&self, kind: LetterKind) -> error::Result<Vec<Letter>> {
        match kind {
            LetterKind::Outgoing => self.list_of::<OutgoingLetter<ObjectId>>().await,
            LetterKind::Incoming => self.list_of::<IncomingLetter<ObjectId>>().await,
        }
    }

    pub async fn get(&self, kind: LetterKind, id: &str) -> error::Result<Letter> {
        let id = parse_id(id)?;
        match kind {
            LetterKind::Outgoing => self.find::<OutgoingLetter<ObjectId>>(id).await.map(Into::into),
            LetterKind::Incoming => self.find::<IncomingLetter<ObjectId>>(id).await.map(Into::into),
        }
    }

    pub async fn create(&self, kind: LetterKind, payload: LetterPayload) -> error::Result<Letter> {
        match kind {
            LetterKind::Outgoing => self.create_of::<OutgoingLetter<ObjectId>>(payload).await,
            LetterKind::Incoming => self.create_of::<IncomingLetter<ObjectId>>(payload).await,
        }
    }

    pub async fn update(
        &self,
        kind: LetterKind,
        id: &str,
        payload: LetterPayload,
    ) -> error::Result<Letter> {
        let id = parse_id(id)?;
        match kind {
            LetterKind::Outgoing => self.update_of::<OutgoingLetter<ObjectId>>(id, payload).await,
            LetterKind::Incoming => self.update_of::<IncomingLetter<ObjectId>>(id, payload).await,
        }
    }

    pub async fn delete(&self, kind: LetterKind, id: &str) -> error::Result<()> {
        let id = parse_id(id)?;
        match kind {
            LetterKind::Outgoing => self.delete_of::<OutgoingLetter<ObjectId>>(id).await,
            LetterKind::Incoming => self.delete_of::<IncomingLetter<ObjectId>>(id).await,
        }
    }

    /// Location on disk of the letter's attachment.
    pub async fn attachment(&self, kind: LetterKind, id: &str) -> error::Result<PathBuf> {
        let id = parse_id(id)?;
        let relative = match kind {
            LetterKind::Outgoing => self.attachment_of::<OutgoingLetter<ObjectId>>(id).await?,
            LetterKind::Incoming => self.attachment_of::<IncomingLetter<ObjectId>>(id).await?,
        };
        let path = self.attachments()?.resolve(&relative)?;
        if !path.is_file() {
            log::warn!("Attachment {} is referenced but missing on disk", relative);
            return Err(anyhow!("File does not exist on server").code(404));
        }
        Ok(path)
    }

    /// Spreadsheet of both registries, each sheet in list order.
    pub async fn export(&self) -> error::Result<Vec<u8>> {
        let mut letters = self.list(LetterKind::Outgoing).await?;
        letters.extend(self.list(LetterKind::Incoming).await?);
        let count = letters.len();

        let workbook = web::block(move || export::workbook(&letters).map_err(|e| e.to_string()))
            .await
            .map_err(|e| anyhow!("Blocking export task failed: {}", e).code(500))?
            .map_err(|e| anyhow!("Error filling excel file: {}", e).code(500))?;
        log::info!("Exported {} letters", count);
        Ok(workbook)
    }

    fn repository<L: StoredLetter>(&self) -> error::Result<RepositoryObject<L>> {
        self.context.try_get_repository::<L>()
    }

    async fn find<L: StoredLetter>(&self, id: ObjectId) -> error::Result<L> {
        self.repository::<L>()?
            .find("id", &Bson::ObjectId(id))
            .await?
            .ok_or_else(not_found)
    }

    /// Newest registration date first; letters of the same day by newest id.
    async fn list_of<L: StoredLetter>(&self) -> error::Result<Vec<Letter>> {
        let mut letters = self.repository::<L>()?.find_all(0, u32::MAX).await?;
        letters.sort_by(|a, b| {
            b.registration_date()
                .cmp(&a.registration_date())
                .then_with(|| b.id().bytes().cmp(&a.id().bytes()))
        });
        Ok(letters.into_iter().map(Into::into).collect())
    }

    async fn store(&self, kind: LetterKind, file: Option<Upload>) -> error::Result<Option<String>> {
        match file {
            Some(upload) => Ok(Some(self.attachments()?.save(kind, upload).await?)),
            None => Ok(None),
        }
    }

    /// Removes a file the registry no longer references. Failures are only logged.
    async fn discard(&self, file_path: Option<String>) {
        let Some(file_path) = file_path else {
            return;
        };
        let removed = match self.attachments() {
            Ok(store) => store.remove(&file_path).await,
            Err(err) => Err(err),
        };
        if let Err(err) = removed {
            log::error!("Failed to remove attachment {}: {}", file_path, err);
        }
    }

    async fn create_of<L: StoredLetter>(&self, payload: LetterPayload) -> error::Result<Letter> {
        let draft = L::draft(&payload.fields)?;
        let repository = self.repository::<L>()?;
        let file_path = self.store(L::KIND, payload.file).await?;

        let letter = L::from_draft(ObjectId::new(), draft, file_path.clone());
        let inserted = repository.insert(&letter).await;
        if !matches!(inserted, Ok(true)) {
            self.discard(file_path).await;
            inserted?;
            return Err(anyhow!("Letter {} already exists", letter.id()).code(409));
        }
        log::info!("Registered {} letter {}", L::KIND, letter.id());
        Ok(letter.into())
    }

    /// The new attachment is saved and the record persisted before the old file goes,
    /// so a failed update never leaves the letter pointing at a removed file.
    async fn update_of<L: StoredLetter>(
        &self,
        id: ObjectId,
        payload: LetterPayload,
    ) -> error::Result<Letter> {
        let repository = self.repository::<L>()?;
        let mut letter = self.find::<L>(id).await?;
        letter.merge(&payload.fields)?;

        let replace = payload.remove_file() || payload.file.is_some();
        let previous = letter.attachment().map(str::to_string);
        let stored = self.store(L::KIND, payload.file).await?;
        if replace {
            letter.set_attachment(stored.clone());
        }

        let updated = repository.update(&letter).await;
        if !matches!(updated, Ok(true)) {
            self.discard(stored).await;
            updated?;
            return Err(not_found());
        }
        if replace {
            self.discard(previous).await;
        }
        log::info!("Updated {} letter {}", L::KIND, id);
        Ok(letter.into())
    }

    async fn delete_of<L: StoredLetter>(&self, id: ObjectId) -> error::Result<()> {
        let repository = self.repository::<L>()?;
        let Some(letter) = repository.delete("id", &id).await? else {
            return Err(not_found());
        };
        self.discard(letter.attachment().map(str::to_string)).await;
        log::info!("Deleted {} letter {}", L::KIND, id);
        Ok(())
    }

    async fn attachment_of<L: StoredLetter>(&self, id: ObjectId) -> error::Result<String> {
        let letter = self.find::<L>(id).await?;
        letter
            .attachment()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("File not found").code(404))
    }
}

#[cfg(test)]
mod tests {
    use std::{path::Path, sync::Arc};

    use async_trait::async_trait;
    use common::{
        context::ServiceState,
        repository::{test_repository::TestRepository, Repository},
    };

    use super::*;

    type Outgoing = OutgoingLetter<ObjectId>;

    /// In-memory storage whose inserts or updates can be switched off.
    struct Unreliable {
        inner: TestRepository<Outgoing>,
        accept_insert: bool,
        accept_update: bool,
    }

    #[async_trait]
    impl Repository<Outgoing> for Unreliable {
        async fn insert(&self, item: &Outgoing) -> error::Result<bool> {
            if self.accept_insert {
                self.inner.insert(item).await
            } else {
                Ok(false)
            }
        }

        async fn find(&self, field: &str, value: &Bson) -> error::Result<Option<Outgoing>> {
            self.inner.find(field, value).await
        }

        async fn delete(&self, field: &str, item: &ObjectId) -> error::Result<Option<Outgoing>> {
            self.inner.delete(field, item).await
        }

        async fn update(&self, item: &Outgoing) -> error::Result<bool> {
            if self.accept_update {
                self.inner.update(item).await
            } else {
                Err(anyhow!("Database unavailable").code(503))
            }
        }

        async fn find_all(&self, skip: u32, limit: u32) -> error::Result<Vec<Outgoing>> {
            self.inner.find_all(skip, limit).await
        }
    }

    fn service(files: &Path, accept_insert: bool, accept_update: bool) -> LetterService {
        let mut state = ServiceState::new("mail");
        state.insert::<Outgoing>(Arc::new(Unreliable {
            inner: TestRepository::new(),
            accept_insert,
            accept_update,
        }));
        state.insert_manual(AttachmentStore::new(files));
        LetterService::new(Context(Arc::new(state)))
    }

    fn payload(file: Option<(&str, &str)>, remove_file: bool) -> LetterPayload {
        let mut fields: HashMap<String, String> = [
            ("outgoing_number", "281-СКС"),
            ("registration_date", "2024-01-09"),
            ("recipient", "ACME"),
            ("subject", "Test"),
            ("executor", "Ivanov"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        if remove_file {
            fields.insert("remove_file".to_string(), "true".to_string());
        }
        LetterPayload {
            fields,
            file: file.map(|(name, content)| Upload::new(name, content.as_bytes().to_vec())),
        }
    }

    fn stored_files(root: &Path) -> usize {
        std::fs::read_dir(root.join("outgoing"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[actix_web::test]
    async fn rejected_insert_leaves_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), false, true);

        let err = service
            .create(LetterKind::Outgoing, payload(Some(("scan.pdf", "%PDF")), false))
            .await
            .unwrap_err();
        assert_eq!(err.code, 409);
        assert_eq!(stored_files(dir.path()), 0);
    }

    #[actix_web::test]
    async fn failed_update_keeps_previous_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), true, false);
        let kind = LetterKind::Outgoing;

        let created = service
            .create(kind, payload(Some(("first.pdf", "one")), false))
            .await
            .unwrap();
        let err = service
            .update(kind, created.id(), payload(Some(("second.pdf", "two")), false))
            .await
            .unwrap_err();
        assert_eq!(err.code, 503);

        let err = service
            .update(kind, created.id(), payload(None, true))
            .await
            .unwrap_err();
        assert_eq!(err.code, 503);

        let location = service.attachment(kind, created.id()).await.unwrap();
        assert_eq!(std::fs::read(location).unwrap(), b"one");
        assert_eq!(stored_files(dir.path()), 1);
    }

    #[actix_web::test]
    async fn replaced_and_deleted_attachments_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), true, true);
        let kind = LetterKind::Outgoing;

        let created = service
            .create(kind, payload(Some(("first.pdf", "one")), false))
            .await
            .unwrap();
        let replaced = service
            .update(kind, created.id(), payload(Some(("second.pdf", "two")), false))
            .await
            .unwrap();
        assert!(replaced.file_path().unwrap().ends_with("_second.pdf"));
        assert_eq!(stored_files(dir.path()), 1);

        let kept = service
            .update(kind, created.id(), payload(None, false))
            .await
            .unwrap();
        assert_eq!(kept.file_path(), replaced.file_path());

        service.delete(kind, created.id()).await.unwrap();
        assert_eq!(stored_files(dir.path()), 0);
        assert_eq!(service.delete(kind, created.id()).await.unwrap_err().code, 404);
    }
}
