//! Client for hosted contextual embedding services.
//!
//! Contextual embedding models such as ELMo assign an embedding to every
//! token of a sentence that depends on the whole sentence. Such models
//! are hosted by an embedding service, [`RemoteEmbedder`] holds a session
//! with that service in which the model is loaded.
//!
//! The HTTP client is only compiled with the `remote` feature. Without it,
//! [`RemoteEmbedder::probe`] and [`RemoteEmbedder::connect`] return
//! [`Error::Unavailable`].

use std::time::Duration;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const CAPABILITY: &str = "Remote contextual embeddings";

/// Configuration of the embedding service connection.
///
/// ```
/// use embedprep::remote::RemoteConfig;
///
/// let config = RemoteConfig::from_toml_str("endpoint = \"http://localhost:9000\"").unwrap();
/// assert_eq!(config.endpoint, "http://localhost:9000");
/// assert_eq!(config.output_key, "elmo");
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the service.
    pub endpoint: String,

    /// Module that is loaded in the session.
    pub module: String,

    /// Timeout of a single request in seconds.
    pub timeout_secs: u64,

    /// Key of the token embeddings in embedding responses.
    pub output_key: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            endpoint: "http://127.0.0.1:8501".to_owned(),
            module: "https://tfhub.dev/google/elmo/3".to_owned(),
            timeout_secs: 60,
            output_key: "elmo".to_owned(),
        }
    }
}

impl RemoteConfig {
    pub fn from_toml_str(config: &str) -> Result<Self> {
        toml::from_str(config)
            .map_err(|e| Error::Format(format!("Cannot parse remote configuration: {}", e)))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), path)
    }
}

/// Capabilities reported by an embedding service.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct Capabilities {
    pub version: Option<String>,

    /// Modules that can be loaded. Empty if the service does not restrict
    /// modules.
    pub modules: Vec<String>,
}

impl Capabilities {
    pub fn supports(&self, module: &str) -> bool {
        self.modules.is_empty() || self.modules.iter().any(|m| m == module)
    }
}

/// Embedders that assign embeddings to the tokens of a sentence.
pub trait ContextualEmbedder {
    /// Get the embeddings of a tokenized sentence.
    ///
    /// Returns a matrix with shape *tokens x dims*.
    fn get_vector(&self, tokens: &[&str]) -> Result<Array2<f32>>;
}

/// Session with a contextual embedding service.
///
/// The session is created by [`RemoteEmbedder::connect`] and released
/// by [`RemoteEmbedder::close`] or when the embedder is dropped.
#[derive(Debug)]
pub struct RemoteEmbedder {
    config: RemoteConfig,
    agent: http::Agent,
    session: Option<String>,
}

impl RemoteEmbedder {
    /// Query the capabilities of the service.
    pub fn probe(config: &RemoteConfig) -> Result<Capabilities> {
        http::health(&http::agent(config), config)
    }

    /// Connect to the service and load the configured module.
    ///
    /// Loading a module can take a long time.
    pub fn connect(config: RemoteConfig) -> Result<Self> {
        let agent = http::agent(&config);

        let capabilities = http::health(&agent, &config)?;
        if !capabilities.supports(&config.module) {
            return Err(Error::unavailable(
                CAPABILITY,
                format!("service cannot load module {}", config.module),
            ));
        }

        log::info!(
            "Loading module {} at {}, this can take a while",
            config.module,
            config.endpoint
        );
        let session = http::create_session(&agent, &config)?;
        check_session_id(&session)?;
        log::info!("Opened embedding session {}", session);

        Ok(RemoteEmbedder {
            config,
            agent,
            session: Some(session),
        })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Identifier of the session.
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Release the session.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            http::delete_session(&self.agent, &self.config, &session)?;
            log::info!("Released embedding session {}", session);
        }

        Ok(())
    }
}

impl ContextualEmbedder for RemoteEmbedder {
    fn get_vector(&self, tokens: &[&str]) -> Result<Array2<f32>> {
        if tokens.is_empty() {
            return Ok(Array2::zeros((0, 0)));
        }

        let session = self
            .session
            .as_deref()
            .ok_or_else(|| Error::Remote("Session was released".to_owned()))?;
        let batch = http::embed(&self.agent, &self.config, session, tokens)?;

        squeeze_batch(batch, tokens.len())
    }
}

impl Drop for RemoteEmbedder {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            log::warn!("Cannot release embedding session: {}", err);
        }
    }
}

/// Token embeddings of a batch of sequences.
type Batch = Vec<Vec<Vec<f32>>>;

/// Remove the batch dimension of a batch with a single sequence.
pub(crate) fn squeeze_batch(mut batch: Batch, n_tokens: usize) -> Result<Array2<f32>> {
    if batch.len() != 1 {
        return Err(Error::Format(format!(
            "Expected a batch with one sequence, got: {}",
            batch.len()
        )));
    }

    let sequence = batch.remove(0);
    if sequence.len() != n_tokens {
        return Err(Error::Format(format!(
            "Expected embeddings for {} tokens, got: {}",
            n_tokens,
            sequence.len()
        )));
    }

    let dims = sequence.first().map(Vec::len).unwrap_or(0);
    if let Some(row) = sequence.iter().find(|row| row.len() != dims) {
        return Err(Error::Format(format!(
            "Token embeddings have different lengths: {} and {}",
            dims,
            row.len()
        )));
    }

    let data = sequence.into_iter().flatten().collect();
    Ok(Array2::from_shape_vec((n_tokens, dims), data)?)
}

/// Check that a session identifier is a single URL path segment.
///
/// Only unreserved URL characters are accepted, and the dot segments
/// `.` and `..` are rejected.
fn check_session_id(session: &str) -> Result<()> {
    let unreserved = |c: char| c.is_ascii_alphanumeric() || "-._~".contains(c);
    if session.is_empty() || session.chars().all(|c| c == '.') || !session.chars().all(unreserved)
    {
        return Err(Error::Format(format!(
            "Invalid session identifier: {:?}",
            session
        )));
    }

    Ok(())
}

#[cfg(feature = "remote")]
mod http {
    use std::collections::HashMap;

    use serde::Deserialize;
    use serde_json::{json, Value};

    use super::{Batch, Capabilities, RemoteConfig};
    use crate::error::{Error, Result};

    pub(super) use ureq::Agent;

    #[derive(Deserialize)]
    struct SessionResponse {
        session: String,
    }

    pub(super) fn agent(config: &RemoteConfig) -> Agent {
        ureq::AgentBuilder::new().timeout(config.timeout()).build()
    }

    fn remote_error(url: &str, err: ureq::Error) -> Error {
        Error::Remote(format!("{}: {}", url, err))
    }

    fn parse_error(what: &str, err: std::io::Error) -> Error {
        Error::Format(format!("Cannot parse {} response: {}", what, err))
    }

    pub(super) fn health(agent: &Agent, config: &RemoteConfig) -> Result<Capabilities> {
        let url = config.url("health");
        agent
            .get(&url)
            .call()
            .map_err(|e| remote_error(&url, e))?
            .into_json()
            .map_err(|e| parse_error("health", e))
    }

    pub(super) fn create_session(agent: &Agent, config: &RemoteConfig) -> Result<String> {
        let url = config.url("sessions");
        let response: SessionResponse = agent
            .post(&url)
            .send_json(json!({ "module": config.module }))
            .map_err(|e| remote_error(&url, e))?
            .into_json()
            .map_err(|e| parse_error("session", e))?;
        Ok(response.session)
    }

    pub(super) fn embed(
        agent: &Agent,
        config: &RemoteConfig,
        session: &str,
        tokens: &[&str],
    ) -> Result<Batch> {
        let url = config.url(&format!("sessions/{}/embed", session));
        let mut outputs: HashMap<String, Value> = agent
            .post(&url)
            .send_json(json!({
                "tokens": [tokens],
                "sequence_len": [tokens.len()],
            }))
            .map_err(|e| remote_error(&url, e))?
            .into_json()
            .map_err(|e| parse_error("embedding", e))?;

        let batch = outputs.remove(&config.output_key).ok_or_else(|| {
            Error::Format(format!(
                "Embedding response does not contain '{}'",
                config.output_key
            ))
        })?;

        serde_json::from_value(batch)
            .map_err(|e| Error::Format(format!("Cannot parse token embeddings: {}", e)))
    }

    pub(super) fn delete_session(agent: &Agent, config: &RemoteConfig, session: &str) -> Result<()> {
        let url = config.url(&format!("sessions/{}", session));
        agent
            .delete(&url)
            .call()
            .map_err(|e| remote_error(&url, e))?;
        Ok(())
    }
}

#[cfg(not(feature = "remote"))]
mod http {
    use super::{Batch, Capabilities, RemoteConfig, CAPABILITY};
    use crate::error::{Error, Result};

    #[derive(Clone, Debug)]
    pub(super) struct Agent;

    fn disabled() -> Error {
        Error::unavailable(CAPABILITY, "compiled without the `remote` feature")
    }

    pub(super) fn agent(_config: &RemoteConfig) -> Agent {
        Agent
    }

    pub(super) fn health(_agent: &Agent, _config: &RemoteConfig) -> Result<Capabilities> {
        Err(disabled())
    }

    pub(super) fn create_session(_agent: &Agent, _config: &RemoteConfig) -> Result<String> {
        Err(disabled())
    }

    pub(super) fn embed(
        _agent: &Agent,
        _config: &RemoteConfig,
        _session: &str,
        _tokens: &[&str],
    ) -> Result<Batch> {
        Err(disabled())
    }

    pub(super) fn delete_session(
        _agent: &Agent,
        _config: &RemoteConfig,
        _session: &str,
    ) -> Result<()> {
        Err(disabled())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr2;

    use super::{check_session_id, squeeze_batch, Capabilities, RemoteConfig};
    use crate::error::Error;

    #[test]
    fn squeeze_single_sequence() {
        let batch = vec![vec![vec![1., 2., 3.], vec![4., 5., 6.]]];
        assert_eq!(
            squeeze_batch(batch, 2).unwrap(),
            arr2(&[[1f32, 2., 3.], [4., 5., 6.]])
        );
    }

    #[test]
    fn squeeze_rejects_malformed_batches() {
        assert!(matches!(
            squeeze_batch(vec![vec![vec![1.]], vec![vec![2.]]], 1),
            Err(Error::Format(_))
        ));
        assert!(matches!(
            squeeze_batch(vec![vec![vec![1.]]], 2),
            Err(Error::Format(_))
        ));
        assert!(matches!(
            squeeze_batch(vec![vec![vec![1., 2.], vec![3.]]], 2),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn session_ids_are_single_path_segments() {
        for session in &["s1", "3f2a-91c0", "elmo_v3.session~2"] {
            assert!(check_session_id(session).is_ok());
        }
        for session in &["", ".", "..", "a/b", "x?y", "../admin", "s1#frag", "s 1", "%2F"] {
            assert!(matches!(check_session_id(session), Err(Error::Format(_))));
        }
    }

    #[test]
    fn config_defaults() {
        let config = RemoteConfig::from_toml_str("timeout_secs = 5").unwrap();
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.module, RemoteConfig::default().module);
        assert_eq!(config.url("health"), "http://127.0.0.1:8501/health");
    }

    #[test]
    fn trailing_slash_is_ignored() {
        let config = RemoteConfig {
            endpoint: "http://localhost/api/".to_owned(),
            ..RemoteConfig::default()
        };
        assert_eq!(config.url("sessions"), "http://localhost/api/sessions");
    }

    #[test]
    fn unrestricted_service_supports_all_modules() {
        assert!(Capabilities::default().supports("elmo"));
        let capabilities = Capabilities {
            version: None,
            modules: vec!["elmo".to_owned()],
        };
        assert!(capabilities.supports("elmo"));
        assert!(!capabilities.supports("bert"));
    }

    #[cfg(not(feature = "remote"))]
    #[test]
    fn probe_without_client_is_unavailable() {
        use super::RemoteEmbedder;

        assert!(matches!(
            RemoteEmbedder::probe(&RemoteConfig::default()),
            Err(Error::Unavailable { .. })
        ));
        assert!(matches!(
            RemoteEmbedder::connect(RemoteConfig::default()),
            Err(Error::Unavailable { .. })
        ));
    }

    #[cfg(feature = "remote")]
    mod service {
        use std::io::{BufRead, BufReader, Read, Write};
        use std::net::{TcpListener, TcpStream};
        use std::sync::{Arc, Mutex};
        use std::thread::{self, JoinHandle};

        use ndarray::arr2;
        use serde_json::{json, Value};

        use super::super::{ContextualEmbedder, RemoteConfig, RemoteEmbedder};
        use crate::error::Error;

        type Requests = Arc<Mutex<Vec<(String, String)>>>;

        fn read_request(stream: &mut TcpStream) -> (String, String, Value) {
            let mut reader = BufReader::new(stream);

            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut parts = request_line.split_whitespace();
            let method = parts.next().unwrap().to_owned();
            let path = parts.next().unwrap().to_owned();

            let mut content_len = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                let mut header = line.splitn(2, ':');
                let name = header.next().unwrap().trim();
                if name.eq_ignore_ascii_case("content-length") {
                    content_len = header.next().unwrap().trim().parse().unwrap();
                }
            }

            let mut body = vec![0; content_len];
            reader.read_exact(&mut body).unwrap();
            let body = if body.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&body).unwrap()
            };

            (method, path, body)
        }

        fn respond(method: &str, path: &str, body: &Value) -> (u16, Value) {
            match (method, path) {
                ("GET", "/health") => (
                    200,
                    json!({ "version": "1", "modules": ["elmo", "legacy"] }),
                ),
                ("POST", "/sessions") => {
                    if body["module"] == "elmo" {
                        (200, json!({ "session": "s1" }))
                    } else if body["module"] == "legacy" {
                        (200, json!({ "session": "../admin" }))
                    } else {
                        (404, json!({}))
                    }
                }
                ("POST", "/sessions/s1/embed") => {
                    let tokens = body["tokens"][0].as_array().unwrap();
                    assert_eq!(body["sequence_len"][0], tokens.len());
                    let sequence: Vec<Vec<f32>> = (0..tokens.len())
                        .map(|idx| vec![idx as f32, 1.0])
                        .collect();
                    (200, json!({ "elmo": [sequence], "default": [[1.0, 1.0]] }))
                }
                ("DELETE", "/sessions/s1") => (200, json!({})),
                _ => (404, json!({})),
            }
        }

        /// Serve `n_requests` requests, one per connection.
        fn serve(n_requests: usize) -> (RemoteConfig, Requests, JoinHandle<()>) {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = listener.local_addr().unwrap();
            let requests = Requests::default();

            let log = requests.clone();
            let handle = thread::spawn(move || {
                for stream in listener.incoming().take(n_requests) {
                    let mut stream = stream.unwrap();
                    let (method, path, body) = read_request(&mut stream);
                    let (status, response) = respond(&method, &path, &body);
                    log.lock().unwrap().push((method, path));

                    let response = response.to_string();
                    write!(
                        stream,
                        "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        response.len(),
                        response
                    )
                    .unwrap();
                    stream.flush().unwrap();
                }
            });

            let config = RemoteConfig {
                endpoint: format!("http://{}", addr),
                module: "elmo".to_owned(),
                timeout_secs: 10,
                ..RemoteConfig::default()
            };

            (config, requests, handle)
        }

        fn methods_and_paths(requests: &Requests) -> Vec<(String, String)> {
            requests.lock().unwrap().clone()
        }

        #[test]
        fn probe_reports_capabilities() {
            let (config, _, handle) = serve(1);
            let capabilities = RemoteEmbedder::probe(&config).unwrap();
            handle.join().unwrap();

            assert_eq!(capabilities.version.as_deref(), Some("1"));
            assert_eq!(
                capabilities.modules,
                vec!["elmo".to_owned(), "legacy".to_owned()]
            );
        }

        #[test]
        fn session_lifecycle() {
            let (config, requests, handle) = serve(4);

            let embedder = RemoteEmbedder::connect(config).unwrap();
            assert_eq!(embedder.session(), Some("s1"));

            let embeddings = embedder.get_vector(&["a", "b", "c"]).unwrap();
            assert_eq!(embeddings, arr2(&[[0f32, 1.], [1., 1.], [2., 1.]]));

            embedder.close().unwrap();
            handle.join().unwrap();

            assert_eq!(
                methods_and_paths(&requests),
                vec![
                    ("GET".to_owned(), "/health".to_owned()),
                    ("POST".to_owned(), "/sessions".to_owned()),
                    ("POST".to_owned(), "/sessions/s1/embed".to_owned()),
                    ("DELETE".to_owned(), "/sessions/s1".to_owned()),
                ]
            );
        }

        #[test]
        fn dropping_releases_session() {
            let (config, requests, handle) = serve(3);
            {
                let _embedder = RemoteEmbedder::connect(config).unwrap();
            }
            handle.join().unwrap();

            assert_eq!(
                methods_and_paths(&requests).last(),
                Some(&("DELETE".to_owned(), "/sessions/s1".to_owned()))
            );
        }

        #[test]
        fn unsupported_module_is_unavailable() {
            let (mut config, _, handle) = serve(1);
            config.module = "bert".to_owned();
            assert!(matches!(
                RemoteEmbedder::connect(config),
                Err(Error::Unavailable { .. })
            ));
            handle.join().unwrap();
        }

        #[test]
        fn session_id_with_path_characters_is_rejected() {
            let (mut config, requests, handle) = serve(2);
            config.module = "legacy".to_owned();
            assert!(matches!(
                RemoteEmbedder::connect(config),
                Err(Error::Format(_))
            ));
            handle.join().unwrap();

            // No request was sent to a path built from the identifier.
            assert_eq!(
                methods_and_paths(&requests),
                vec![
                    ("GET".to_owned(), "/health".to_owned()),
                    ("POST".to_owned(), "/sessions".to_owned()),
                ]
            );
        }

        #[test]
        fn unreachable_service_is_a_remote_error() {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);

            let config = RemoteConfig {
                endpoint: format!("http://{}", addr),
                timeout_secs: 1,
                ..RemoteConfig::default()
            };
            assert!(matches!(
                RemoteEmbedder::probe(&config),
                Err(Error::Remote(_))
            ));
        }
    }
}
