use std::sync::Arc;

use actix_web::{dev::Payload, web::Data, FromRequest, HttpRequest};
use anyhow::anyhow;
use type_map::concurrent::TypeMap;

use crate::{
    error::{self, AddCode, ServiceError},
    repository::RepositoryObject,
};

pub struct ServiceState {
    pub repositories: TypeMap,
    pub service_name: String,
}

impl ServiceState {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            repositories: TypeMap::new(),
            service_name: service_name.into(),
        }
    }

    pub fn insert<T: 'static>(&mut self, repository: RepositoryObject<T>) {
        self.repositories.insert(repository);
    }

    pub fn insert_manual<T: Send + Sync + 'static>(&mut self, repository: T) {
        self.repositories.insert(repository);
    }
}

#[derive(Clone)]
pub struct Context(pub Arc<ServiceState>);

impl FromRequest for Context {
    type Error = ServiceError;

    type Future = futures_util::future::Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = match req.app_data::<Data<Arc<ServiceState>>>() {
            Some(state) => Ok(Context(Arc::clone(state))),
            None => Err(anyhow!("No state provided").code(500)),
        };
        futures_util::future::ready(result)
    }
}

impl Context {
    pub fn service_name(&self) -> &str {
        &self.0.service_name
    }

    pub fn get_repository<T: 'static>(&self) -> Option<RepositoryObject<T>> {
        self.0.repositories.get::<RepositoryObject<T>>().cloned()
    }

    pub fn get_repository_manual<T: 'static + Clone>(&self) -> Option<T> {
        self.0.repositories.get::<T>().cloned()
    }

    pub fn try_get_repository<T: 'static>(&self) -> error::Result<RepositoryObject<T>> {
        self.get_repository::<T>().ok_or_else(|| {
            anyhow!(
                "Repository for type {} not found",
                std::any::type_name::<T>()
            )
            .code(500)
        })
    }

    pub fn try_get_repository_manual<T: 'static + Clone>(&self) -> error::Result<T> {
        self.get_repository_manual::<T>().ok_or_else(|| {
            anyhow!("Service state has no {}", std::any::type_name::<T>()).code(500)
        })
    }
}
