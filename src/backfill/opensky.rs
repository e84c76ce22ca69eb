// OpenSky Network state-vector lookup
//
// GET /api/states/all?time=T&icao24=X&extended=1. Requests are authenticated
// with HTTP basic auth or an OAuth2 client-credentials bearer token when
// configured.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use super::{KinematicSnapshot, StateSource};
use crate::error::BackfillError;

pub const OPENSKY_API_BASE: &str = "https://opensky-network.org/api";

pub const OPENSKY_TOKEN_URL: &str =
    "https://auth.opensky-network.org/auth/realms/opensky-network/protocol/openid-connect/token";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Refresh a token this long before it expires
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(120);

/// Token lifetime assumed when the server does not say
const DEFAULT_TOKEN_LIFETIME_S: u64 = 1800;

/// Optional OpenSky credentials. Either pair enables authenticated queries.
#[derive(Debug, Clone, Default)]
pub struct OpenSkyCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl OpenSkyCredentials {
    fn basic(&self) -> Option<(String, String)> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some((u.clone(), p.clone())),
            _ => None,
        }
    }

    fn client(&self) -> Option<(String, String)> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Some((id.clone(), secret.clone()))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// OAuth2 client-credentials token source with in-memory reuse
struct TokenProvider {
    client_id: String,
    client_secret: String,
    token_url: String,
    current: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    async fn token(&self, http: &reqwest::Client) -> Result<String, BackfillError> {
        let mut current = self.current.lock().await;
        if let Some(cached) = current.as_ref() {
            if Instant::now() + TOKEN_REFRESH_MARGIN < cached.expires_at {
                return Ok(cached.token.clone());
            }
        }

        debug!("Requesting OpenSky access token");
        let resp = http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(BackfillError::Token(resp.status()));
        }
        let body: TokenResponse = resp.json().await?;
        let lifetime = body.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_S);

        *current = Some(CachedToken {
            token: body.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });
        Ok(body.access_token)
    }
}

/// Client for the OpenSky `/states/all` endpoint
pub struct OpenSkyClient {
    http: reqwest::Client,
    base_url: String,
    basic_auth: Option<(String, String)>,
    token_provider: Option<TokenProvider>,
}

impl OpenSkyClient {
    pub fn new(credentials: OpenSkyCredentials) -> Result<Self, BackfillError> {
        Self::with_endpoints(credentials, OPENSKY_API_BASE, OPENSKY_TOKEN_URL)
    }

    pub fn with_endpoints(
        credentials: OpenSkyCredentials,
        base_url: &str,
        token_url: &str,
    ) -> Result<Self, BackfillError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let token_provider = credentials.client().map(|(client_id, client_secret)| TokenProvider {
            client_id,
            client_secret,
            token_url: token_url.to_string(),
            current: Mutex::new(None),
        });
        Ok(OpenSkyClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            basic_auth: credentials.basic(),
            token_provider,
        })
    }
}

impl StateSource for OpenSkyClient {
    async fn fetch_state(
        &self,
        icao24: &str,
        time: i64,
    ) -> Result<Option<KinematicSnapshot>, BackfillError> {
        let url = format!("{}/states/all", self.base_url);
        let mut request = self
            .http
            .get(&url)
            .query(&[
                ("time", time.to_string()),
                ("icao24", icao24.to_string()),
                ("extended", "1".to_string()),
            ]);

        if let Some((user, pass)) = &self.basic_auth {
            request = request.basic_auth(user, Some(pass));
        }
        if let Some(provider) = &self.token_provider {
            request = request.bearer_auth(provider.token(&self.http).await?);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            debug!("OpenSky returned HTTP {} for {} at {}", resp.status(), icao24, time);
            return Ok(None);
        }
        let body = resp.text().await?;
        parse_states(&body)
    }

    fn is_authenticated(&self) -> bool {
        self.basic_auth.is_some() || self.token_provider.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct StatesResponse {
    #[serde(default)]
    states: Option<Vec<Vec<Value>>>,
}

/// Decode a `/states/all` body into the first state vector, if any.
///
/// State vectors are positional arrays: 1 callsign, 5 longitude, 6 latitude,
/// 7 barometric altitude, 9 velocity, 10 true track, 11 vertical rate,
/// 13 geometric altitude.
pub fn parse_states(body: &str) -> Result<Option<KinematicSnapshot>, BackfillError> {
    let parsed: StatesResponse =
        serde_json::from_str(body).map_err(|e| BackfillError::Decode(e.to_string()))?;
    let row = match parsed.states.as_ref().and_then(|s| s.first()) {
        Some(row) => row,
        None => return Ok(None),
    };

    let num = |i: usize| row.get(i).and_then(Value::as_f64);
    let callsign = row
        .get(1)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    Ok(Some(KinematicSnapshot {
        callsign,
        lon: num(5),
        lat: num(6),
        baro_alt_m: num(7),
        velocity_mps: num(9),
        true_track_deg: num(10),
        vertical_rate_mps: num(11),
        geo_alt_m: num(13),
    }))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    const SAMPLE: &str = r#"{
        "time": 1765818360,
        "states": [
            ["8991a2", "EVA12   ", "Taiwan", 1765818355, 1765818359,
             121.6021, 25.1187, 3048.0, false, 154.3, 238.5, -5.2, null, 3120.4,
             "4651", false, 0]
        ]
    }"#;

    #[test]
    fn test_parse_states() {
        let state = parse_states(SAMPLE).unwrap().unwrap();
        assert_eq!(state.callsign.as_deref(), Some("EVA12"));
        assert_eq!(state.lon, Some(121.6021));
        assert_eq!(state.lat, Some(25.1187));
        assert_eq!(state.baro_alt_m, Some(3048.0));
        assert_eq!(state.velocity_mps, Some(154.3));
        assert_eq!(state.true_track_deg, Some(238.5));
        assert_eq!(state.vertical_rate_mps, Some(-5.2));
        assert_eq!(state.geo_alt_m, Some(3120.4));
    }

    #[test]
    fn test_parse_states_empty() {
        assert_eq!(parse_states(r#"{"time": 1, "states": null}"#).unwrap(), None);
        assert_eq!(parse_states(r#"{"time": 1, "states": []}"#).unwrap(), None);
        assert_eq!(parse_states(r#"{"time": 1}"#).unwrap(), None);
    }

    #[test]
    fn test_parse_states_short_vector() {
        let state = parse_states(r#"{"states": [["8991a2", null, "TW", 0, 0, 121.5, 25.0, null]]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(state.callsign, None);
        assert_eq!(state.lat, Some(25.0));
        assert_eq!(state.baro_alt_m, None);
        assert_eq!(state.velocity_mps, None);
        assert_eq!(state.geo_alt_m, None);
    }

    #[test]
    fn test_parse_states_malformed() {
        assert!(matches!(parse_states("<html>"), Err(BackfillError::Decode(_))));
    }

    #[test]
    fn test_authentication_detection() {
        let anon = OpenSkyClient::new(OpenSkyCredentials::default()).unwrap();
        assert!(!anon.is_authenticated());

        let basic = OpenSkyClient::new(OpenSkyCredentials {
            username: Some("user".into()),
            password: Some("pass".into()),
            ..Default::default()
        })
        .unwrap();
        assert!(basic.is_authenticated());

        let half = OpenSkyClient::new(OpenSkyCredentials {
            client_id: Some("id".into()),
            ..Default::default()
        })
        .unwrap();
        assert!(!half.is_authenticated());

        let oauth = OpenSkyClient::new(OpenSkyCredentials {
            client_id: Some("id".into()),
            client_secret: Some("secret".into()),
            ..Default::default()
        })
        .unwrap();
        assert!(oauth.is_authenticated());
    }

    /// Read one request, returning its head. The body is drained so the
    /// connection closes cleanly.
    async fn read_request(stream: &mut TcpStream) -> Option<String> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_string();
                let body_len = head
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                while buf.len() < end + 4 + body_len {
                    let n = stream.read(&mut chunk).await.ok()?;
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                return Some(head);
            }
        }
    }

    /// Local stand-in for the OpenSky API and token endpoint.
    ///
    /// `POST /token` issues `tok-1`, `tok-2`, ... with the given lifetime;
    /// `GET /api/states/all` answers `states_status` (SAMPLE on 200).
    struct StubServer {
        addr: SocketAddr,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl StubServer {
        async fn start(expires_in: Option<u64>, states_status: u16) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let requests = Arc::new(Mutex::new(Vec::new()));
            let tokens_issued = Arc::new(AtomicUsize::new(0));

            let log = requests.clone();
            tokio::spawn(async move {
                while let Ok((mut stream, _)) = listener.accept().await {
                    let log = log.clone();
                    let tokens_issued = tokens_issued.clone();
                    tokio::spawn(async move {
                        let Some(head) = read_request(&mut stream).await else {
                            return;
                        };
                        let (status, body) = if head.starts_with("POST /token") {
                            let n = tokens_issued.fetch_add(1, Ordering::SeqCst) + 1;
                            let body = match expires_in {
                                Some(secs) => format!(
                                    r#"{{"access_token":"tok-{}","expires_in":{}}}"#,
                                    n, secs
                                ),
                                None => format!(r#"{{"access_token":"tok-{}"}}"#, n),
                            };
                            (200, body)
                        } else if states_status == 200 {
                            (200, SAMPLE.to_string())
                        } else {
                            (states_status, String::new())
                        };
                        log.lock().unwrap().push(head.to_lowercase());

                        let reason = if status == 200 { "OK" } else { "Error" };
                        let response = format!(
                            "HTTP/1.1 {} {}\r\n\
                             Content-Type: application/json\r\n\
                             Content-Length: {}\r\n\
                             Connection: close\r\n\r\n{}",
                            status,
                            reason,
                            body.len(),
                            body
                        );
                        let _ = stream.write_all(response.as_bytes()).await;
                        let _ = stream.shutdown().await;
                    });
                }
            });

            StubServer { addr, requests }
        }

        fn client(&self, credentials: OpenSkyCredentials) -> OpenSkyClient {
            OpenSkyClient::with_endpoints(
                credentials,
                &format!("http://{}/api", self.addr),
                &format!("http://{}/token", self.addr),
            )
            .unwrap()
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }

        fn token_requests(&self) -> usize {
            self.requests()
                .iter()
                .filter(|r| r.starts_with("post /token"))
                .count()
        }

        fn state_requests(&self) -> Vec<String> {
            self.requests()
                .into_iter()
                .filter(|r| r.starts_with("get /api/states/all"))
                .collect()
        }
    }

    fn oauth() -> OpenSkyCredentials {
        OpenSkyCredentials {
            client_id: Some("id".into()),
            client_secret: Some("secret".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_state_query() {
        let server = StubServer::start(None, 200).await;
        let client = server.client(OpenSkyCredentials::default());

        let state = client.fetch_state("8991a2", 1765818360).await.unwrap().unwrap();
        assert_eq!(state.lat, Some(25.1187));

        let requests = server.state_requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0]
            .starts_with("get /api/states/all?time=1765818360&icao24=8991a2&extended=1 "));
        assert!(!requests[0].contains("authorization:"));
        assert_eq!(server.token_requests(), 0);
    }

    #[tokio::test]
    async fn test_fetch_state_server_error_is_no_data() {
        let server = StubServer::start(None, 500).await;
        let client = server.client(OpenSkyCredentials::default());
        assert_eq!(client.fetch_state("8991a2", 1000).await.unwrap(), None);
        assert_eq!(server.state_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_state_basic_auth() {
        let server = StubServer::start(None, 200).await;
        let client = server.client(OpenSkyCredentials {
            username: Some("user".into()),
            password: Some("pass".into()),
            ..Default::default()
        });
        client.fetch_state("8991a2", 1000).await.unwrap();
        // base64("user:pass")
        assert!(server.state_requests()[0].contains("authorization: basic dxnlcjpwyxnz"));
        assert_eq!(server.token_requests(), 0);
    }

    #[tokio::test]
    async fn test_token_reused_across_requests() {
        let server = StubServer::start(Some(3600), 200).await;
        let client = server.client(oauth());

        client.fetch_state("8991a2", 1000).await.unwrap();
        client.fetch_state("8991a2", 1010).await.unwrap();

        assert_eq!(server.token_requests(), 1);
        let requests = server.state_requests();
        assert_eq!(requests.len(), 2);
        assert!(requests
            .iter()
            .all(|r| r.contains("authorization: bearer tok-1")));
    }

    #[tokio::test]
    async fn test_token_without_expiry_uses_default_lifetime() {
        let server = StubServer::start(None, 200).await;
        let client = server.client(oauth());

        client.fetch_state("8991a2", 1000).await.unwrap();
        client.fetch_state("8991a2", 1010).await.unwrap();
        assert_eq!(server.token_requests(), 1);
    }

    #[tokio::test]
    async fn test_token_near_expiry_is_refreshed() {
        // Inside the refresh margin from the moment it is issued
        let server = StubServer::start(Some(60), 200).await;
        let client = server.client(oauth());

        client.fetch_state("8991a2", 1000).await.unwrap();
        client.fetch_state("8991a2", 1010).await.unwrap();

        assert_eq!(server.token_requests(), 2);
        let requests = server.state_requests();
        assert!(requests[0].contains("authorization: bearer tok-1"));
        assert!(requests[1].contains("authorization: bearer tok-2"));
    }

    #[tokio::test]
    async fn test_unreachable_token_endpoint_is_an_error() {
        // Nothing listens on the token endpoint's port once the listener is dropped
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = OpenSkyClient::with_endpoints(
            oauth(),
            &format!("http://{}/api", addr),
            &format!("http://{}/token", addr),
        )
        .unwrap();
        assert!(matches!(
            client.fetch_state("8991a2", 1000).await,
            Err(BackfillError::Http(_))
        ));
    }
}
