use std::time::Duration;

use base64::Engine;
use reqwest::{header::ACCEPT, Client, ClientBuilder, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use thiserror::Error;
use tracing::Instrument;

use crate::valset::{InvalidEthereumAddress, Valset, ValsetTypeWrapper};

/// Tendermint URI arguments are JSON values, so the string path keeps its quotes.
pub const CURRENT_VALSET_QUERY_PATH: &str = "\"/custom/peggy/currentValset/\"";

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Failed to make request {url}: {source}")]
    Request { url: String, source: reqwest::Error },

    #[error("Unsuccessful status code from {url}: {source}")]
    Status { url: String, source: reqwest::Error },

    #[error("ABCI query {path} at height {height} failed with code {code}: {log}")]
    QueryFailed {
        path: String,
        height: u64,
        code: u32,
        log: String,
    },

    #[error("Failed to create http client: {0}")]
    Client(reqwest::Error),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Couldn't parse {endpoint} response: {source}")]
    Response {
        endpoint: &'static str,
        source: serde_json::Error,
    },

    #[error("ABCI query response carries no value")]
    MissingValue,

    #[error("ABCI query value is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("ABCI query value is not a valset document: {0}")]
    Valset(serde_json::Error),

    #[error(transparent)]
    EthereumAddress(#[from] InvalidEthereumAddress),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[derive(Debug, Clone, Deserialize)]
struct JsonRpcEnvelope<T> {
    result: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeStatus {
    pub sync_info: SyncInfo,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncInfo {
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub latest_block_height: u64,
    pub catching_up: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct AbciQueryResult {
    response: AbciQueryResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct AbciQueryResponse {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[mockall::automock]
#[async_trait::async_trait]
pub trait CosmosRpc: Send + Sync {
    /// `GET /status` of the node.
    async fn status(&self) -> Result<NodeStatus, FetchError>;

    /// `GET /abci_query` pinned to `height`, never with proofs.
    async fn abci_query(&self, path: &str, height: u64) -> Result<AbciQueryResponse, FetchError>;
}

pub struct ReqwestCosmosClient {
    base_uri: String,
    client: Client,
}

impl ReqwestCosmosClient {
    fn normalize_url(base_url: &str) -> String {
        base_url.strip_suffix('/').unwrap_or(base_url).to_owned()
    }

    pub fn new(base_uri: &str, timeout: Duration) -> Result<Self, RpcError> {
        let client = ClientBuilder::new().timeout(timeout).build().map_err(RpcError::Client)?;

        Ok(Self {
            base_uri: Self::normalize_url(base_uri),
            client,
        })
    }

    fn status_request(&self) -> RequestBuilder {
        self.client
            .get(format!("{}/status", self.base_uri))
            .header(ACCEPT, "application/json")
    }

    fn abci_query_request(&self, path: &str, height: u64) -> RequestBuilder {
        let height = height.to_string();
        self.client
            .get(format!("{}/abci_query", self.base_uri))
            .header(ACCEPT, "application/json")
            .query(&[("path", path), ("height", height.as_str()), ("prove", "false")])
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        endpoint: &'static str,
    ) -> Result<T, FetchError> {
        let url = format!("{}/{endpoint}", self.base_uri);
        tracing::debug!("Url: {url}");

        let response = request.send().await.map_err(|source| RpcError::Request {
            url: url.clone(),
            source,
        })?;

        tracing::debug!("Received response with status {}", response.status());

        let bytes = response
            .error_for_status()
            .map_err(|source| RpcError::Status {
                url: url.clone(),
                source,
            })?
            .bytes()
            .await
            .map_err(|source| RpcError::Request { url, source })?;

        let envelope: JsonRpcEnvelope<T> =
            serde_json::from_slice(&bytes).map_err(|source| DecodeError::Response { endpoint, source })?;
        Ok(envelope.result)
    }
}

#[async_trait::async_trait]
impl CosmosRpc for ReqwestCosmosClient {
    async fn status(&self) -> Result<NodeStatus, FetchError> {
        self.get_json(self.status_request(), "status").await
    }

    async fn abci_query(&self, path: &str, height: u64) -> Result<AbciQueryResponse, FetchError> {
        let result: AbciQueryResult = self
            .get_json(self.abci_query_request(path, height), "abci_query")
            .await?;
        Ok(result.response)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValsetFetch {
    Ready { valset: Valset, height: u64 },
    NodeSyncing { latest_block_height: u64 },
}

pub fn decode_valset_value(value: &str) -> Result<Valset, DecodeError> {
    let raw = base64::engine::general_purpose::STANDARD.decode(value.trim())?;
    let wrapper: ValsetTypeWrapper = serde_json::from_slice(&raw).map_err(DecodeError::Valset)?;
    tracing::debug!("Decoded {} document", wrapper.kind);
    Ok(wrapper.value)
}

async fn fetch_latest_valset_impl(rpc: &impl CosmosRpc) -> Result<ValsetFetch, FetchError> {
    tracing::info!("Reading sync status of the cosmos node");
    let status = rpc.status().await?;
    let height = status.sync_info.latest_block_height;

    if status.sync_info.catching_up {
        tracing::warn!(
            latest_block_height = height,
            "This node is still syncing! You can not deploy using this validator set!"
        );
        return Ok(ValsetFetch::NodeSyncing {
            latest_block_height: height,
        });
    }

    tracing::info!(height, "Querying current valset");
    let response = rpc.abci_query(CURRENT_VALSET_QUERY_PATH, height).await?;
    if response.code != 0 {
        return Err(RpcError::QueryFailed {
            path: CURRENT_VALSET_QUERY_PATH.to_owned(),
            height,
            code: response.code,
            log: response.log,
        }
        .into());
    }

    let value = response.value.ok_or(DecodeError::MissingValue)?;
    let valset = decode_valset_value(&value)?;
    tracing::info!(
        height,
        nonce = valset.nonce,
        members = valset.members.len(),
        "Obtained current valset"
    );
    Ok(ValsetFetch::Ready { valset, height })
}

/// Reads the current valset at the node's latest height. A node that is
/// still catching up yields `NodeSyncing` without issuing the ABCI query.
pub async fn fetch_latest_valset(rpc: &impl CosmosRpc) -> Result<ValsetFetch, FetchError> {
    fetch_latest_valset_impl(rpc)
        .instrument(tracing::info_span!("fetch_latest_valset"))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valset::Validator;
    use std::collections::HashMap;

    fn encode(document: &serde_json::Value) -> String {
        base64::engine::general_purpose::STANDARD.encode(document.to_string())
    }

    fn status(height: u64, catching_up: bool) -> NodeStatus {
        NodeStatus {
            sync_info: SyncInfo {
                latest_block_height: height,
                catching_up,
            },
        }
    }

    fn valset_document() -> serde_json::Value {
        serde_json::json!({
            "type": "peggy/Valset",
            "value": {
                "nonce": "3",
                "members": [
                    {"power": "10", "ethereum_address": "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"},
                    {"power": "5", "ethereum_address": "0xBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB"}
                ]
            }
        })
    }

    fn expected_valset() -> Valset {
        Valset {
            nonce: 3,
            members: vec![
                Validator {
                    power: 10,
                    ethereum_address: "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".to_owned(),
                },
                Validator {
                    power: 5,
                    ethereum_address: "0xBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB".to_owned(),
                },
            ],
        }
    }

    #[test]
    fn decode_reproduces_encoded_valset() {
        let valset = decode_valset_value(&encode(&valset_document())).unwrap();
        assert_eq!(valset, expected_valset());
    }

    #[test]
    fn decode_rejects_bad_base64() {
        assert!(matches!(
            decode_valset_value("not*base64!"),
            Err(DecodeError::Base64(_))
        ));
    }

    #[test]
    fn decode_rejects_non_valset_json() {
        let value = base64::engine::general_purpose::STANDARD.encode(r#"{"type": "peggy/Valset"}"#);
        assert!(matches!(decode_valset_value(&value), Err(DecodeError::Valset(_))));
    }

    #[tokio::test]
    async fn query_is_pinned_to_status_height() {
        let mut rpc = MockCosmosRpc::new();
        rpc.expect_status().times(1).returning(|| Ok(status(4242, false)));
        rpc.expect_abci_query()
            .withf(|path, height| path.to_string() == CURRENT_VALSET_QUERY_PATH && *height == 4242)
            .times(1)
            .returning(|_, _| {
                Ok(AbciQueryResponse {
                    value: Some(encode(&valset_document())),
                    ..Default::default()
                })
            });

        let result = fetch_latest_valset(&rpc).await.unwrap();

        assert_eq!(
            result,
            ValsetFetch::Ready {
                valset: expected_valset(),
                height: 4242,
            }
        );
    }

    #[tokio::test]
    async fn syncing_node_is_never_queried() {
        let mut rpc = MockCosmosRpc::new();
        rpc.expect_status().times(1).returning(|| Ok(status(77, true)));
        rpc.expect_abci_query().never();

        let result = fetch_latest_valset(&rpc).await.unwrap();

        assert_eq!(
            result,
            ValsetFetch::NodeSyncing {
                latest_block_height: 77
            }
        );
    }

    #[tokio::test]
    async fn failed_query_code_is_rpc_error() {
        let mut rpc = MockCosmosRpc::new();
        rpc.expect_status().returning(|| Ok(status(10, false)));
        rpc.expect_abci_query().returning(|_, _| {
            Ok(AbciQueryResponse {
                code: 6,
                log: "unknown query path".to_owned(),
                value: None,
            })
        });

        let err = fetch_latest_valset(&rpc).await.unwrap_err();
        assert!(matches!(err, FetchError::Rpc(RpcError::QueryFailed { code: 6, height: 10, .. })));
    }

    #[tokio::test]
    async fn missing_value_is_decode_error() {
        let mut rpc = MockCosmosRpc::new();
        rpc.expect_status().returning(|| Ok(status(10, false)));
        rpc.expect_abci_query().returning(|_, _| Ok(AbciQueryResponse::default()));

        let err = fetch_latest_valset(&rpc).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(DecodeError::MissingValue)));
    }

    #[tokio::test]
    async fn status_failure_propagates() {
        let mut rpc = MockCosmosRpc::new();
        rpc.expect_status().returning(|| {
            Err(DecodeError::Response {
                endpoint: "status",
                source: serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
            }
            .into())
        });
        rpc.expect_abci_query().never();

        let err = fetch_latest_valset(&rpc).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(DecodeError::Response { endpoint: "status", .. })));
    }

    #[test]
    fn status_response_parses_tendermint_layout() {
        let raw = r#"{
            "jsonrpc": "2.0",
            "id": -1,
            "result": {
                "node_info": {"moniker": "validator", "network": "peggy-test"},
                "sync_info": {
                    "latest_block_hash": "AB12",
                    "latest_block_height": "1520",
                    "latest_block_time": "2020-08-20T10:00:00Z",
                    "catching_up": false
                },
                "validator_info": {}
            }
        }"#;
        let envelope: JsonRpcEnvelope<NodeStatus> = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.result, status(1520, false));
    }

    #[test]
    fn abci_query_response_parses_tendermint_layout() {
        let raw = r#"{
            "jsonrpc": "2.0",
            "id": -1,
            "result": {
                "response": {
                    "code": 0,
                    "log": "",
                    "info": "",
                    "index": "0",
                    "key": null,
                    "value": "e30=",
                    "proofOps": null,
                    "height": "1520",
                    "codespace": ""
                }
            }
        }"#;
        let envelope: JsonRpcEnvelope<AbciQueryResult> = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.result.response.value.as_deref(), Some("e30="));
        assert_eq!(envelope.result.response.code, 0);
    }

    #[test]
    fn abci_query_url_carries_pinned_params() {
        let client = ReqwestCosmosClient::new("http://localhost:26657/", Duration::from_secs(5)).unwrap();
        let request = client
            .abci_query_request(CURRENT_VALSET_QUERY_PATH, 1520)
            .build()
            .unwrap();

        assert_eq!(request.url().path(), "/abci_query");
        let params: HashMap<String, String> = request.url().query_pairs().into_owned().collect();
        assert_eq!(params.get("path").map(String::as_str), Some("\"/custom/peggy/currentValset/\""));
        assert_eq!(params.get("height").map(String::as_str), Some("1520"));
        assert_eq!(params.get("prove").map(String::as_str), Some("false"));
    }

    #[test]
    fn status_url_strips_trailing_slash() {
        let client = ReqwestCosmosClient::new("http://localhost:26657/", Duration::from_secs(5)).unwrap();
        let request = client.status_request().build().unwrap();
        assert_eq!(request.url().as_str(), "http://localhost:26657/status");
    }

    #[test]
    fn status_response_accepts_numeric_height() {
        let raw = r#"{"result": {"sync_info": {"latest_block_height": 1520, "catching_up": true}}}"#;
        let envelope: JsonRpcEnvelope<NodeStatus> = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.result, status(1520, true));
    }

    mod http {
        use super::*;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;
        use tokio::task::JoinHandle;

        /// Answers one request per connection with the canned `(status, body)`
        /// pairs in order, then returns the request lines it saw.
        async fn stub_node(responses: Vec<(u16, String)>) -> (String, JoinHandle<Vec<String>>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base_uri = format!("http://{}", listener.local_addr().unwrap());

            let handle = tokio::spawn(async move {
                let mut request_lines = Vec::new();
                for (status, body) in responses {
                    let (mut socket, _) = listener.accept().await.unwrap();
                    let mut buf = vec![0u8; 8192];
                    let mut read = 0;
                    loop {
                        let n = socket.read(&mut buf[read..]).await.unwrap();
                        read += n;
                        if n == 0 || buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    let request = String::from_utf8_lossy(&buf[..read]).into_owned();
                    request_lines.push(request.lines().next().unwrap_or_default().to_owned());

                    let response = format!(
                        "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    socket.write_all(response.as_bytes()).await.unwrap();
                    socket.shutdown().await.ok();
                }
                request_lines
            });
            (base_uri, handle)
        }

        fn client(base_uri: &str) -> ReqwestCosmosClient {
            ReqwestCosmosClient::new(base_uri, Duration::from_secs(5)).unwrap()
        }

        fn status_body(height: u64, catching_up: bool) -> String {
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": -1,
                "result": {"sync_info": {"latest_block_height": height.to_string(), "catching_up": catching_up}}
            })
            .to_string()
        }

        #[tokio::test]
        async fn error_status_is_rpc_error() {
            let (base_uri, server) = stub_node(vec![(500, "{}".to_owned())]).await;

            let err = client(&base_uri).status().await.unwrap_err();

            match err {
                FetchError::Rpc(RpcError::Status { url, source }) => {
                    assert_eq!(url, format!("{base_uri}/status"));
                    assert_eq!(source.status(), Some(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
                }
                other => panic!("Expected a status error, got {other:?}"),
            }
            server.await.unwrap();
        }

        #[tokio::test]
        async fn refused_connection_is_rpc_error() {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base_uri = format!("http://{}", listener.local_addr().unwrap());
            drop(listener);

            let err = client(&base_uri).status().await.unwrap_err();

            assert!(matches!(err, FetchError::Rpc(RpcError::Request { .. })), "got {err:?}");
        }

        #[tokio::test]
        async fn unparsable_body_is_decode_error() {
            let (base_uri, server) = stub_node(vec![
                (200, "<html>gateway</html>".to_owned()),
                (200, r#"{"jsonrpc": "2.0", "id": -1}"#.to_owned()),
            ])
            .await;
            let client = client(&base_uri);

            let garbage = client.status().await.unwrap_err();
            let missing_result = client.status().await.unwrap_err();

            assert!(matches!(garbage, FetchError::Decode(DecodeError::Response { endpoint: "status", .. })));
            assert!(matches!(
                missing_result,
                FetchError::Decode(DecodeError::Response { endpoint: "status", .. })
            ));
            server.await.unwrap();
        }

        #[tokio::test]
        async fn valset_is_fetched_at_status_height() {
            let abci_body = serde_json::json!({
                "jsonrpc": "2.0",
                "id": -1,
                "result": {"response": {"code": 0, "log": "", "value": encode(&valset_document())}}
            })
            .to_string();
            let (base_uri, server) = stub_node(vec![(200, status_body(77, false)), (200, abci_body)]).await;

            let result = fetch_latest_valset(&client(&base_uri)).await.unwrap();

            assert_eq!(
                result,
                ValsetFetch::Ready {
                    valset: expected_valset(),
                    height: 77,
                }
            );
            let request_lines = server.await.unwrap();
            assert_eq!(request_lines[0], "GET /status HTTP/1.1");
            assert_eq!(
                request_lines[1],
                "GET /abci_query?path=%22%2Fcustom%2Fpeggy%2FcurrentValset%2F%22&height=77&prove=false HTTP/1.1"
            );
        }

        #[tokio::test]
        async fn syncing_node_gets_a_single_request() {
            let (base_uri, server) = stub_node(vec![(200, status_body(12, true))]).await;

            let result = fetch_latest_valset(&client(&base_uri)).await.unwrap();

            assert_eq!(result, ValsetFetch::NodeSyncing { latest_block_height: 12 });
            assert_eq!(server.await.unwrap().len(), 1);
        }
    }
}
