//! Errors raised while maintaining IO associations.

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("external route '{route}' is already claimed by source {existing_source} (cannot also assign it to {new_source})")]
    TopicCollision {
        route: String,
        existing_source: uuid::Uuid,
        new_source: uuid::Uuid,
    },
}

pub type RouterResult<T> = Result<T, RouterError>;
