//! Bundle loading contract.
//!
//! The host asks a [`BundleLoader`] for the script bundle either
//! synchronously (blocking the Scripting context until the payload is
//! available) or asynchronously (fire the fetch, deliver the result
//! through a completion callback). Which mode is used is a host
//! decision driven by the fast-refresh/remote-debug flags.

use crate::error::EngineError;

/// A loaded script bundle ready for evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    /// Source URL or path, used for diagnostics and stack traces.
    pub source_url: String,
    /// Raw bundle payload.
    pub payload: Vec<u8>,
}

impl Script {
    /// Creates a script from a source url and payload.
    #[must_use]
    pub fn new(source_url: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            source_url: source_url.into(),
            payload: payload.into(),
        }
    }
}

/// Completion notifier for [`BundleLoader::load_async`].
pub type LoadCompletion = Box<dyn FnOnce(Result<Script, EngineError>) + Send>;

/// Bundle loading capability.
///
/// Networking, caching, and packager protocols all live behind this
/// trait; the host only sees a payload or an error.
pub trait BundleLoader: Send + Sync {
    /// Loads the bundle at `path`, blocking the caller until done.
    fn load_sync(&self, path: &str) -> Result<Script, EngineError>;

    /// Starts loading the bundle at `path` and invokes `done` when the
    /// payload is available or the fetch failed.
    ///
    /// `done` may be invoked from any thread; the host re-posts the
    /// result onto the Scripting context itself.
    fn load_async(&self, path: &str, done: LoadCompletion);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoLoader;

    impl BundleLoader for EchoLoader {
        fn load_sync(&self, path: &str) -> Result<Script, EngineError> {
            Ok(Script::new(path, path.as_bytes().to_vec()))
        }

        fn load_async(&self, path: &str, done: LoadCompletion) {
            done(self.load_sync(path));
        }
    }

    #[test]
    fn sync_load_returns_script() {
        let script = EchoLoader.load_sync("app.bundle").unwrap();
        assert_eq!(script.source_url, "app.bundle");
        assert_eq!(script.payload, b"app.bundle");
    }

    #[test]
    fn async_load_invokes_completion() {
        let (tx, rx) = std::sync::mpsc::channel();
        EchoLoader.load_async(
            "app.bundle",
            Box::new(move |result| {
                tx.send(result).unwrap();
            }),
        );
        let script = rx.recv().unwrap().unwrap();
        assert_eq!(script.source_url, "app.bundle");
    }
}
