//! hyper-util connector that dials through the `AddressRacer`.
//!
//! # Responsibilities
//! - Turn a request URI into a raced TCP connection
//! - Wrap https targets in a rustls session verified against webpki roots
//! - Expose the result as a hyper-compatible IO type

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use http::Uri;
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;

use crate::net::racer::{AddressRacer, ConnectError};

/// `tower::Service<Uri>` producing raced, optionally TLS-wrapped streams.
#[derive(Clone)]
pub struct RacingConnector {
    racer: Arc<AddressRacer>,
    tls: TlsConnector,
    shutdown: CancellationToken,
}

impl RacingConnector {
    /// `shutdown` aborts every in-flight connection race when cancelled.
    pub fn new(racer: Arc<AddressRacer>, shutdown: CancellationToken) -> Result<Self, rustls::Error> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self {
            racer,
            tls: TlsConnector::from(Arc::new(config)),
            shutdown,
        })
    }

    async fn dial(self, uri: Uri) -> Result<RacedStream, ConnectError> {
        let host = uri
            .host()
            .ok_or(ConnectError::MissingHost)?
            .trim_matches(|c| c == '[' || c == ']')
            .to_string();
        let is_tls = uri.scheme_str() == Some("https");
        let port = uri.port_u16().unwrap_or(if is_tls { 443 } else { 80 });

        let tcp = self.racer.connect(&host, port, &self.shutdown).await?;
        if !is_tls {
            return Ok(RacedStream::new(MaybeTlsStream::Plain(tcp)));
        }

        let server_name = ServerName::try_from(host.clone()).map_err(|e| ConnectError::Tls {
            host: host.clone(),
            source: io::Error::new(io::ErrorKind::InvalidInput, e),
        })?;
        let tls = self
            .tls
            .connect(server_name, tcp)
            .await
            .map_err(|source| ConnectError::Tls { host, source })?;
        Ok(RacedStream::new(MaybeTlsStream::Tls(Box::new(tls))))
    }
}

impl tower::Service<Uri> for RacingConnector {
    type Response = RacedStream;
    type Error = ConnectError;
    type Future = BoxFuture<'static, Result<RacedStream, ConnectError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        Box::pin(self.clone().dial(uri))
    }
}

pub enum MaybeTlsStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Connection handed to hyper.
pub struct RacedStream {
    io: TokioIo<MaybeTlsStream>,
}

impl RacedStream {
    fn new(stream: MaybeTlsStream) -> Self {
        Self {
            io: TokioIo::new(stream),
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self.io.inner(), MaybeTlsStream::Tls(_))
    }
}

impl hyper::rt::Read for RacedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: hyper::rt::ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_read(cx, buf)
    }
}

impl hyper::rt::Write for RacedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().io).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_shutdown(cx)
    }
}

impl Connection for RacedStream {
    fn connected(&self) -> Connected {
        Connected::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectConfig, DnsConfig};
    use crate::net::dns::tests::StaticResolver;
    use crate::net::dns::DnsPreference;
    use crate::net::penalty::AddressPenaltyBox;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    fn connector(resolver: StaticResolver) -> RacingConnector {
        let dns = DnsPreference::new(Arc::new(resolver), &DnsConfig::default());
        let racer = AddressRacer::new(
            Arc::new(dns),
            Arc::new(AddressPenaltyBox::new(Duration::from_secs(60))),
            &ConnectConfig::default(),
        );
        RacingConnector::new(Arc::new(racer), CancellationToken::new()).unwrap()
    }

    #[tokio::test]
    async fn plain_http_dials_resolved_host() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let uri: Uri = format!("http://relay.test:{}/x", port).parse().unwrap();
        let stream = connector(StaticResolver::default().with("relay.test", &["127.0.0.1"]))
            .oneshot(uri)
            .await
            .unwrap();
        assert!(!stream.is_tls());

        let mut inner = stream.io.into_inner();
        inner.write_all(b"ping").await.unwrap();
        let mut echoed = [0u8; 4];
        inner.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"ping");
    }

    #[tokio::test]
    async fn uri_without_host_is_rejected() {
        let uri: Uri = "/relative/only".parse().unwrap();
        let result = connector(StaticResolver::default()).oneshot(uri).await;
        assert!(matches!(result, Err(ConnectError::MissingHost)));
    }
}
