use failure::{Context, Error as FailureError, Fail};

#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "{}", _0)]
    Config(String),
    #[fail(display = "WB API is still rate limiting after {} attempts", _0)]
    RateLimited(usize),
    #[fail(display = "WB API {}: {}", status, body)]
    Upstream { status: u16, body: String },
    #[fail(display = "Unexpected response: {}", _0)]
    UnexpectedResponse(String),
    #[fail(display = "Parse error")]
    Parse,
    #[fail(display = "Http client error")]
    HttpClient,
    #[fail(display = "Supabase request failed")]
    Persistence,
}

/// Finds the first `Error` kind in the cause chain, whether it was
/// returned directly or attached with `.context(..)`.
pub fn error_kind(e: &FailureError) -> Option<&Error> {
    e.iter_chain()
        .filter_map(|cause| {
            if let Some(ctx) = cause.downcast_ref::<Context<Error>>() {
                Some(ctx.get_context())
            } else {
                cause.downcast_ref::<Error>()
            }
        })
        .nth(0)
}

/// Renders the whole cause chain as a single diagnostic line.
pub fn diagnostic(e: &FailureError) -> String {
    e.iter_chain().map(|cause| cause.to_string()).collect::<Vec<_>>().join(": ")
}
