use std::{sync::Arc, time::Duration};

use http_body_util::{BodyExt as _, Full};
use hyper::{
    body::Bytes,
    header::{self, HeaderValue},
    Method, Request, StatusCode, Uri,
};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider},
    pki_types::{CertificateDer, ServerName, UnixTime},
    DigitallySignedStruct, SignatureScheme,
};
use tokio::runtime::{Handle, Runtime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::Forwarder;
use crate::{config::Config, datapoint::DataPoint, proto, BuildError, Error};

const TOKEN_HEADER: &str = "X-SF-TOKEN";

type HttpClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Posts datapoints to an ingest endpoint over HTTP(S).
///
/// Requests run on a small runtime owned by the forwarder, so callers stay synchronous: each call to
/// [`forward`](Forwarder::forward) blocks until the endpoint answers, the response-header timeout expires, or the
/// cancellation token fires, whichever comes first.
pub struct HttpForwarder {
    runtime: Option<Runtime>,
    handle: Handle,
    client: HttpClient,
    endpoint: Uri,
    user_agent: HeaderValue,
    auth_token: HeaderValue,
    timeout: Duration,
}

impl HttpForwarder {
    /// Creates a new `HttpForwarder` from the given configuration.
    ///
    /// # Errors
    ///
    /// If the URL or headers are invalid, the TLS configuration cannot be built, or the runtime cannot be created, an
    /// error will be returned.
    pub fn new(config: &Config) -> Result<Self, BuildError> {
        let endpoint = config
            .url()
            .parse::<Uri>()
            .map_err(|_| BuildError::InvalidUrl { url: config.url().to_string() })?;
        let user_agent = HeaderValue::from_str(config.user_agent())
            .map_err(|_| BuildError::InvalidHeader { name: "User-Agent" })?;
        let mut auth_token = HeaderValue::from_str(config.auth_token())
            .map_err(|_| BuildError::InvalidHeader { name: TOKEN_HEADER })?;
        auth_token.set_sensitive(true);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("sfxclient-forwarder")
            .enable_all()
            .build()
            .map_err(BuildError::Runtime)?;

        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(config.timeout()));

        let tls = if config.tls_insecure_skip_verify() {
            HttpsConnectorBuilder::new().with_tls_config(insecure_tls_config()?)
        } else {
            HttpsConnectorBuilder::new().with_native_roots().map_err(BuildError::NativeRoots)?
        };
        let https = tls.https_or_http().enable_http1().wrap_connector(http);

        let client = {
            let _guard = runtime.enter();
            Client::builder(TokioExecutor::new())
                .pool_max_idle_per_host(config.max_idle_connections() as usize)
                .build(https)
        };

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            client,
            endpoint,
            user_agent,
            auth_token,
            timeout: config.timeout(),
        })
    }

    fn build_request(&self, body: Vec<u8>) -> Result<Request<Full<Bytes>>, Error> {
        Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header(header::CONTENT_TYPE, proto::CONTENT_TYPE)
            .header(header::CONNECTION, "Keep-Alive")
            .header(header::USER_AGENT, self.user_agent.clone())
            .header(TOKEN_HEADER, self.auth_token.clone())
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| Error::Post(e.to_string()))
    }
}

impl Forwarder for HttpForwarder {
    fn forward(&self, cancel: &CancellationToken, points: &[DataPoint]) -> Result<(), Error> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let body = proto::encode(points)?;
        debug!(points = points.len(), bytes = body.len(), endpoint = %self.endpoint, "Posting datapoints.");
        let request = self.build_request(body)?;

        let client = self.client.clone();
        let cancel = cancel.clone();
        let timeout = self.timeout;
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.handle.spawn(async move {
            let result = tokio::select! {
                () = cancel.cancelled() => Err(Error::Cancelled),
                result = send(&client, request, timeout) => result,
            };
            let _ = tx.send(result);
        });

        // The task only goes away without answering if the runtime is shutting down.
        rx.recv().unwrap_or(Err(Error::Cancelled))
    }
}

impl Drop for HttpForwarder {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn send(client: &HttpClient, request: Request<Full<Bytes>>, timeout: Duration) -> Result<(), Error> {
    let response = match tokio::time::timeout(timeout, client.request(request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => return Err(Error::Post(e.to_string())),
        Err(_) => return Err(Error::Post(format!("no response within {timeout:?}"))),
    };

    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| Error::Response(e.to_string()))?
        .to_bytes();
    trace!(status = status.as_u16(), bytes = body.len(), "Received ingest response.");

    if status != StatusCode::OK {
        return Err(Error::Status { code: status.as_u16(), body: String::from_utf8_lossy(&body).into_owned() });
    }

    match serde_json::from_slice::<String>(&body) {
        Ok(reply) if reply == "OK" => Ok(()),
        _ => Err(Error::InvalidBody { body: String::from_utf8_lossy(&body).into_owned() }),
    }
}

fn insecure_tls_config() -> Result<rustls::ClientConfig, BuildError> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoCertificateVerification(provider)))
        .with_no_client_auth();
    Ok(config)
}

/// Accepts any server certificate while still checking handshake signatures.
#[derive(Debug)]
struct NoCertificateVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use hyper::header;
    use tokio_util::sync::CancellationToken;

    use super::HttpForwarder;
    use crate::{
        config::Config,
        datapoint::{DataPoint, Dimensions},
        forwarder::Forwarder as _,
        BuildError, Error,
    };

    // Skipping verification avoids depending on the host's root store.
    fn local_config() -> Config {
        Config::new()
            .with_url("http://127.0.0.1:1/v2/datapoint")
            .with_auth_token("token")
            .with_tls_insecure_skip_verify(true)
    }

    #[test]
    fn request_carries_ingest_headers() {
        let forwarder = HttpForwarder::new(&local_config().with_user_agent("test/1")).unwrap();
        let request = forwarder.build_request(vec![1, 2, 3]).unwrap();

        let headers = request.headers();
        assert_eq!(request.method(), hyper::Method::POST);
        assert_eq!(request.uri(), "http://127.0.0.1:1/v2/datapoint");
        assert_eq!(headers[header::CONTENT_TYPE], "application/x-protobuf");
        assert_eq!(headers[header::CONNECTION], "Keep-Alive");
        assert_eq!(headers[header::USER_AGENT], "test/1");
        assert_eq!(headers["X-SF-TOKEN"], "token");
        assert!(headers["X-SF-TOKEN"].is_sensitive());
    }

    #[test]
    fn invalid_url_is_rejected() {
        let result = HttpForwarder::new(&local_config().with_url("not a url"));
        assert!(matches!(result, Err(BuildError::InvalidUrl { .. })));
    }

    #[test]
    fn invalid_token_is_rejected() {
        let result = HttpForwarder::new(&local_config().with_auth_token("bad\ntoken"));
        assert!(matches!(result, Err(BuildError::InvalidHeader { name: "X-SF-TOKEN" })));
    }

    #[test]
    fn cancelled_token_skips_network() {
        let forwarder = HttpForwarder::new(&local_config()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let points = vec![DataPoint::gauge("g", Dimensions::new(), 1)];
        assert!(matches!(forwarder.forward(&cancel, &points), Err(Error::Cancelled)));
    }
}
