//! Execution bridge
//!
//! Turns a module source (an in-memory byte buffer or a network response)
//! into a running guest instance: compile, wire imports through the session,
//! instantiate, start. The progression is strictly forward and one-shot;
//! [`Runner::execute`] consumes the runner, and no step is ever retried.

use crate::error::RunnerError;
use crate::session::{Session, SessionConfig, WasiState};
use reqwest::header::CONTENT_TYPE;
use wasmtime::{Engine, Instance, Module, Store};

/// Where the module bytes come from
pub enum ModuleSource {
    /// A complete module image already in memory
    Bytes(Vec<u8>),

    /// An awaited network response whose body is the module image
    Response(reqwest::Response),
}

impl From<Vec<u8>> for ModuleSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for ModuleSource {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<reqwest::Response> for ModuleSource {
    fn from(response: reqwest::Response) -> Self {
        Self::Response(response)
    }
}

/// How a response body is consumed before compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Consume the body chunk by chunk as it arrives; only chosen when the
    /// declared content type marks the payload as a wasm image
    Streaming,

    /// Download the full body, then compile
    Buffered,
}

/// Pick the fetch strategy from the declared content type.
///
/// An ordered policy list evaluated top to bottom; the first matching
/// predicate wins.
pub fn choose_fetch_strategy(content_type: Option<&str>) -> FetchStrategy {
    const POLICY: &[(fn(Option<&str>) -> bool, FetchStrategy)] = &[
        (
            |ct| ct.is_some_and(|c| c.trim_start().starts_with("application/wasm")),
            FetchStrategy::Streaming,
        ),
        (|_| true, FetchStrategy::Buffered),
    ];

    for (applies, strategy) in POLICY {
        if applies(content_type) {
            return *strategy;
        }
    }
    FetchStrategy::Buffered
}

/// A guest that has been driven through its entry point
pub struct ExecutedModule {
    store: Store<WasiState>,
    instance: Instance,
}

impl std::fmt::Debug for ExecutedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Store has no Debug; the handle is the interesting part anyway
        f.debug_struct("ExecutedModule")
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

impl ExecutedModule {
    /// Handle to the instance for post-hoc inspection
    pub fn instance(&self) -> Instance {
        self.instance
    }

    /// Look up an export on the finished instance
    pub fn get_export(&mut self, name: &str) -> Option<wasmtime::Extern> {
        self.instance.get_export(&mut self.store, name)
    }
}

/// One-shot pipe from module source to running guest
pub struct Runner {
    engine: Engine,
    session: Session,
}

impl Runner {
    /// Create a runner for one invocation.
    ///
    /// Configuration problems (a missing filesystem delegate, an engine
    /// that cannot be built) surface here, before any module bytes are
    /// touched.
    pub fn new(config: SessionConfig) -> Result<Self, RunnerError> {
        let session = Session::new(config)?;

        let mut engine_config = wasmtime::Config::new();
        // The guest is a wasm32 artifact
        engine_config.wasm_memory64(false);
        let engine = Engine::new(&engine_config)
            .map_err(|e| RunnerError::configuration(format!("engine creation failed: {e}")))?;

        Ok(Self { engine, session })
    }

    /// The session this runner drives
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Compile a module from its source.
    ///
    /// Byte buffers compile directly. Responses are verified (HTTP success
    /// status) and their bodies consumed per [`choose_fetch_strategy`].
    /// Compile errors propagate untranslated.
    pub async fn compile(&self, source: ModuleSource) -> Result<Module, RunnerError> {
        let bytes = match source {
            ModuleSource::Bytes(bytes) => {
                if bytes.is_empty() {
                    return Err(RunnerError::invalid_input("empty module buffer"));
                }
                bytes
            }
            ModuleSource::Response(response) => Self::download(response).await?,
        };
        Module::new(&self.engine, &bytes).map_err(RunnerError::Compile)
    }

    async fn download(mut response: reqwest::Response) -> Result<Vec<u8>, RunnerError> {
        let status = response.status();
        if !status.is_success() {
            return Err(RunnerError::invalid_input(format!(
                "module fetch returned HTTP status {status}"
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let strategy = choose_fetch_strategy(content_type.as_deref());
        tracing::debug!(?strategy, ?content_type, "downloading module body");

        match strategy {
            FetchStrategy::Streaming => {
                let mut bytes =
                    Vec::with_capacity(response.content_length().unwrap_or(0) as usize);
                while let Some(chunk) = response
                    .chunk()
                    .await
                    .map_err(|source| RunnerError::Fetch { source })?
                {
                    bytes.extend_from_slice(&chunk);
                }
                Ok(bytes)
            }
            FetchStrategy::Buffered => Ok(response
                .bytes()
                .await
                .map_err(|source| RunnerError::Fetch { source })?
                .to_vec()),
        }
    }

    /// Compile, instantiate against the session's imports, and start.
    ///
    /// Consumes the runner: the compile → instantiate → start progression
    /// cannot be replayed. Returns the live instance for callers interested
    /// in post-hoc inspection.
    pub async fn execute(self, source: ModuleSource) -> Result<ExecutedModule, RunnerError> {
        let module = self.compile(source).await?;

        let spec = self.session.spec()?;
        tracing::debug!(spec = %spec.summary(), "instantiating guest");

        let wasi = self.session.build_wasi_ctx(&spec)?;
        let mut store = Store::new(&self.engine, WasiState { wasi });

        let linker = self.session.import_linker(&self.engine)?;
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(RunnerError::Instantiate)?;

        self.session.start(&mut store, &instance)?;

        Ok(ExecutedModule { store, instance })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wasm_content_type_streams() {
        assert_eq!(
            choose_fetch_strategy(Some("application/wasm")),
            FetchStrategy::Streaming
        );
        assert_eq!(
            choose_fetch_strategy(Some("application/wasm; charset=binary")),
            FetchStrategy::Streaming
        );
    }

    #[test]
    fn test_other_content_types_buffer() {
        assert_eq!(
            choose_fetch_strategy(Some("application/octet-stream")),
            FetchStrategy::Buffered
        );
        assert_eq!(
            choose_fetch_strategy(Some("text/html")),
            FetchStrategy::Buffered
        );
        assert_eq!(choose_fetch_strategy(None), FetchStrategy::Buffered);
    }
}
