use std::{path::PathBuf, sync::Arc};

use actix_cors::Cors;
use actix_web::{
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    middleware, web, App,
};
use common::{
    context::ServiceState,
    entities::letter::{IncomingLetter, OutgoingLetter},
    error,
    repository::{mongo_repository::MongoRepository, test_repository::TestRepository},
};
use mongodb::bson::oid::ObjectId;

use handlers::{
    indexer::health,
    letter::{
        delete_letter, download_excel, download_letter, get_letter, get_letters, post_letter,
        put_letter,
    },
};
use service::attachments::AttachmentStore;

pub mod handlers;
pub mod service;

pub const SERVICE_NAME: &str = "mail";

pub fn create_app(
    state: Arc<ServiceState>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Response = ServiceResponse<impl MessageBody>,
        Config = (),
        InitError = (),
        Error = actix_web::Error,
    >,
> {
    let cors = Cors::permissive();
    App::new()
        .wrap(cors)
        .wrap(middleware::Logger::default())
        .app_data(web::Data::new(state))
        .service(health)
        .service(download_excel)
        .service(get_letters)
        .service(post_letter)
        .service(get_letter)
        .service(put_letter)
        .service(delete_letter)
        .service(download_letter)
}

pub async fn mongo_state(
    mongo_uri: &str,
    database: &str,
    files_dir: impl Into<PathBuf>,
) -> error::Result<Arc<ServiceState>> {
    let outgoing = MongoRepository::<OutgoingLetter<ObjectId>>::new(mongo_uri, database, "outgoing").await?;
    let incoming = MongoRepository::<IncomingLetter<ObjectId>>::new(mongo_uri, database, "incoming").await?;

    let mut state = ServiceState::new(SERVICE_NAME);
    state.insert::<OutgoingLetter<ObjectId>>(Arc::new(outgoing));
    state.insert::<IncomingLetter<ObjectId>>(Arc::new(incoming));
    state.insert_manual(AttachmentStore::new(files_dir));
    Ok(Arc::new(state))
}

/// A registry that lives only as long as the process. Attachments still go to `files_dir`.
pub fn in_memory_state(files_dir: impl Into<PathBuf>) -> Arc<ServiceState> {
    let mut state = ServiceState::new(SERVICE_NAME);
    state.insert::<OutgoingLetter<ObjectId>>(Arc::new(TestRepository::new()));
    state.insert::<IncomingLetter<ObjectId>>(Arc::new(TestRepository::new()));
    state.insert_manual(AttachmentStore::new(files_dir));
    Arc::new(state)
}
