use failure::Error as FailureError;
use futures::future::BoxFuture;

/// Service layer Future
pub type ServiceFuture<'a, T> = BoxFuture<'a, Result<T, FailureError>>;
