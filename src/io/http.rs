use async_trait::async_trait;
use reqwest::header::CONTENT_RANGE;
use reqwest::{Client, Response, StatusCode};
use std::io;
use std::time::Duration;

use super::ChunkSource;

/// Streams the body of a remote file as entry data
///
/// Transient failures (timeouts, dropped connections) are retried by
/// re-requesting the rest of the body with a Range header. The resumed
/// response must start exactly where the received data ends.
pub struct HttpSource {
    client: Client,
    url: String,
    response: Option<Response>,
    size: Option<u64>,
    received: u64,
    max_retry: u32,
}

impl HttpSource {
    /// Create a new HTTP source
    ///
    /// This sends the initial GET request and fails on a non-success status
    pub async fn new(url: String) -> io::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(io::Error::other)?;

        let resp = client.get(&url).send().await.map_err(io::Error::other)?;

        if !resp.status().is_success() {
            return Err(io::Error::other(format!(
                "HTTP request failed with status: {}",
                resp.status()
            )));
        }

        let size = resp.content_length();

        Ok(Self {
            client,
            url,
            response: Some(resp),
            size,
            received: 0,
            max_retry: 10,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Last non-empty path segment of the URL, usable as an entry name
    pub fn file_name(&self) -> Option<&str> {
        url_file_name(&self.url)
    }

    /// Total bytes received from the network
    pub fn received_bytes(&self) -> u64 {
        self.received
    }

    async fn reconnect(&mut self) -> Result<Response, reqwest::Error> {
        let range = format!("bytes={}-", self.received);
        self.client
            .get(&self.url)
            .header("Range", &range)
            .send()
            .await
    }
}

fn url_file_name(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let path = path.split_once("://").map_or(path, |(_, rest)| rest);
    let (_, path) = path.split_once('/')?;
    path.rsplit('/').find(|segment| !segment.is_empty())
}

/// First byte offset of a `Content-Range: bytes START-END/TOTAL` value
fn content_range_start(value: &str) -> Option<u64> {
    let range = value.trim().strip_prefix("bytes ")?;
    let (start, _) = range.split_once('-')?;
    start.trim().parse().ok()
}

#[async_trait]
impl ChunkSource for HttpSource {
    async fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut retry_count = 0;

        loop {
            if self.response.is_none() {
                match self.reconnect().await {
                    Ok(resp) if resp.status() == StatusCode::PARTIAL_CONTENT => {
                        let start = resp
                            .headers()
                            .get(CONTENT_RANGE)
                            .and_then(|value| value.to_str().ok())
                            .and_then(content_range_start);
                        if start != Some(self.received) {
                            return Err(io::Error::other(format!(
                                "HTTP resume returned range starting at {:?}, expected {}",
                                start, self.received
                            )));
                        }
                        self.response = Some(resp);
                    }
                    Ok(resp) => {
                        return Err(io::Error::other(format!(
                            "HTTP resume failed with status: {}",
                            resp.status()
                        )));
                    }
                    Err(e) if (e.is_timeout() || e.is_connect()) && retry_count < self.max_retry => {
                        retry_count += 1;
                        tracing::warn!(
                            url = %self.url,
                            "connection error, retry {}/{}: {}",
                            retry_count,
                            self.max_retry,
                            e
                        );
                        tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
                        continue;
                    }
                    Err(e) => return Err(io::Error::other(e)),
                }
            }
            let Some(response) = self.response.as_mut() else {
                continue;
            };

            match response.chunk().await {
                Ok(Some(bytes)) => {
                    self.received += bytes.len() as u64;
                    return Ok(Some(bytes.to_vec()));
                }
                Ok(None) => return Ok(None),
                // a connection dropped mid-body surfaces as a decode error
                Err(e)
                    if (e.is_timeout() || e.is_body() || e.is_decode())
                        && retry_count < self.max_retry =>
                {
                    retry_count += 1;
                    tracing::warn!(
                        url = %self.url,
                        "body interrupted after {} bytes, retry {}/{}: {}",
                        self.received,
                        retry_count,
                        self.max_retry,
                        e
                    );
                    self.response = None;
                    tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
                }
                Err(e) => return Err(io::Error::other(e)),
            }
        }
    }

    fn size_hint(&self) -> Option<u64> {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        String::from_utf8_lossy(&request).to_ascii_lowercase()
    }

    /// Serve one response per connection, in order, closing each connection
    /// after its response. Returns the requests that were received.
    async fn serve(responses: Vec<&'static str>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/files/data.bin", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let mut requests = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                requests.push(read_request(&mut stream).await);
                // the client may hang up first when it rejects a response
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
            requests
        });
        (url, server)
    }

    async fn drain(source: &mut HttpSource) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        while let Some(chunk) = source.next_chunk().await? {
            data.extend(chunk);
        }
        Ok(data)
    }

    #[test]
    fn test_url_file_name() {
        assert_eq!(url_file_name("https://example.com/a/b.zip"), Some("b.zip"));
        assert_eq!(url_file_name("http://example.com/data/report.csv?sig=1#top"), Some("report.csv"));
        assert_eq!(url_file_name("https://example.com/dir/"), Some("dir"));
        assert_eq!(url_file_name("https://example.com/"), None);
        assert_eq!(url_file_name("https://example.com"), None);
    }

    #[test]
    fn test_content_range_start() {
        assert_eq!(content_range_start("bytes 5-9/10"), Some(5));
        assert_eq!(content_range_start("bytes 0-99/*"), Some(0));
        assert_eq!(content_range_start("bytes */10"), None);
        assert_eq!(content_range_start("items 5-9/10"), None);
    }

    #[tokio::test]
    async fn test_resumes_dropped_body() {
        let (url, server) = serve(vec![
            "HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nhello",
            "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes 5-9/10\r\nContent-Length: 5\r\n\r\nworld",
        ])
        .await;

        let mut source = HttpSource::new(url).await.unwrap();
        assert_eq!(source.size_hint(), Some(10));
        assert_eq!(source.file_name(), Some("data.bin"));
        assert_eq!(drain(&mut source).await.unwrap(), b"helloworld");
        assert_eq!(source.received_bytes(), 10);

        let requests = server.await.unwrap();
        assert!(!requests[0].contains("range:"));
        assert!(requests[1].contains("range: bytes=5-"));
    }

    #[tokio::test]
    async fn test_rejects_misplaced_resume() {
        let (url, server) = serve(vec![
            "HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nhello",
            "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes 0-9/10\r\nContent-Length: 10\r\n\r\nhelloworld",
        ])
        .await;

        let mut source = HttpSource::new(url).await.unwrap();
        assert_eq!(source.next_chunk().await.unwrap(), Some(b"hello".to_vec()));
        assert!(source.next_chunk().await.is_err());
        assert_eq!(source.received_bytes(), 5);
        server.await.unwrap();
    }
}
