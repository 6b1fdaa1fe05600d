use failure::Error;
use futures::future::BoxFuture;
use hyper::header::HeaderValue;

mod supabase;
pub use self::supabase::*;

mod warehouses;
pub use self::warehouses::*;

pub type ApiFuture<T> = BoxFuture<'static, Result<T, Error>>;

/// Header value holding a credential, hidden from `Debug` output.
fn secret_header(value: &str) -> Result<HeaderValue, Error> {
    let mut header = HeaderValue::from_str(value)?;
    header.set_sensitive(true);
    Ok(header)
}
