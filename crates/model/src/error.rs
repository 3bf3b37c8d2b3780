/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The content is moderated, either the prompt or the response.
    Moderated,
    /// The model provider is rate limited.
    RateLimitExceeded,
    /// Any other errors, e.g. network failures or malformed responses.
    Other,
}
