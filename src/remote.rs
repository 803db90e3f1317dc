// 🌐 Remote Lookup - one awaited call, at most one record back
//
// Two flavours:
// - Table:    GET  {base}/rest/v1/{table}?state=ilike.X&...&limit=1   (hosted table, PostgREST style)
// - Endpoint: POST {url} {state, city, bond_limit, name} → {"record": ... | null}

use serde::Deserialize;
use tracing::debug;

use crate::error::{ChatbotError, Result};
use crate::matcher::LookupQuery;
use crate::records::BondRecord;
use crate::validation::format_amount;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteTarget {
    Table {
        base_url: String,
        table: String,
        api_key: Option<String>,
    },
    Endpoint {
        url: String,
    },
}

#[derive(Debug, Clone)]
pub struct RemoteLookup {
    client: reqwest::Client,
    target: RemoteTarget,
}

#[derive(Debug, Deserialize)]
struct EndpointResponse {
    #[serde(default)]
    record: Option<BondRecord>,
}

impl RemoteLookup {
    pub fn new(target: RemoteTarget) -> Self {
        RemoteLookup {
            client: reqwest::Client::new(),
            target,
        }
    }

    pub fn table(base_url: impl Into<String>, table: impl Into<String>, api_key: Option<String>) -> Self {
        Self::new(RemoteTarget::Table {
            base_url: base_url.into(),
            table: table.into(),
            api_key,
        })
    }

    pub fn endpoint(url: impl Into<String>) -> Self {
        Self::new(RemoteTarget::Endpoint { url: url.into() })
    }

    pub fn target(&self) -> &RemoteTarget {
        &self.target
    }

    pub fn describe(&self) -> String {
        match &self.target {
            RemoteTarget::Table { base_url, table, .. } => format!("table {} at {}", table, base_url),
            RemoteTarget::Endpoint { url } => format!("endpoint {}", url),
        }
    }

    /// Single equality query. Non-2xx statuses are errors.
    pub async fn fetch(&self, query: &LookupQuery) -> Result<Option<BondRecord>> {
        match &self.target {
            RemoteTarget::Table { base_url, table, api_key } => {
                let url = table_query_url(base_url, table, query);
                debug!("Remote table query: {}", url);

                let mut request = self.client.get(&url).header("Accept", "application/json");
                if let Some(key) = api_key {
                    request = request
                        .header("apikey", key)
                        .header("Authorization", format!("Bearer {}", key));
                }

                let response = request.send().await?;
                if !response.status().is_success() {
                    return Err(ChatbotError::RemoteStatus(response.status().as_u16()));
                }

                let rows: Vec<BondRecord> = response.json().await?;
                Ok(rows.into_iter().next())
            }
            RemoteTarget::Endpoint { url } => {
                debug!("Remote endpoint lookup: POST {}", url);

                let response = self.client.post(url).json(query).send().await?;
                if !response.status().is_success() {
                    return Err(ChatbotError::RemoteStatus(response.status().as_u16()));
                }

                let body: EndpointResponse = response.json().await?;
                Ok(body.record)
            }
        }
    }

    /// Query URL for the table flavour; None for endpoints
    pub fn table_url(&self, query: &LookupQuery) -> Option<String> {
        match &self.target {
            RemoteTarget::Table { base_url, table, .. } => Some(table_query_url(base_url, table, query)),
            RemoteTarget::Endpoint { .. } => None,
        }
    }
}

fn table_query_url(base_url: &str, table: &str, query: &LookupQuery) -> String {
    format!(
        "{}/rest/v1/{}?select=*&state=ilike.{}&city=ilike.{}&name=ilike.{}&bond_limit=eq.{}&limit=1",
        base_url.trim_end_matches('/'),
        urlencoding::encode(table),
        urlencoding::encode(&escape_pattern(&query.state)),
        urlencoding::encode(&escape_pattern(&query.city)),
        urlencoding::encode(&escape_pattern(&query.name)),
        format_amount(query.bond_limit),
    )
}

/// Escape ilike wildcards so the remote comparison stays an equality
fn escape_pattern(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.trim().chars() {
        if matches!(c, '\\' | '%' | '_' | '*') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// ============================================================================
// TESTS
// ============================================================================

/// Canned single-response HTTP servers shared by the lookup tests
#[cfg(test)]
pub(crate) mod test_server {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serve exactly one canned HTTP response; returns the base URL
    pub(crate) async fn one_shot_server(status: &'static str, body: &'static str) -> String {
        let (base, received, release) = gated_server(status, body).await;
        tokio::spawn(async move {
            let _ = received.await;
            let _ = release.send(());
        });
        base
    }

    /// Like `one_shot_server`, but holds the response back.
    ///
    /// `received` fires once the request has arrived; the response is only
    /// written after `release` is sent.
    pub(crate) async fn gated_server(
        status: &'static str,
        body: &'static str,
    ) -> (String, oneshot::Receiver<()>, oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = received_tx.send(());
            let _ = release_rx.await;

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        (format!("http://{}", addr), received_rx, release_tx)
    }
}
