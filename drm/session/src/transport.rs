use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use drm_core::ProtectionScheme;

use crate::error::TransportError;
use crate::provider::KeyRequest;
use crate::session::SessionId;

const PLAYREADY_SOAP_ACTION: &str =
    "\"http://schemas.microsoft.com/DRM/2007/03/protocols/AcquireLicense\"";

/**
    An outbound license request, fully assembled.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseRequest {
    pub scheme: ProtectionScheme,
    pub session_id: SessionId,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl LicenseRequest {
    /**
        Set a header, replacing any existing one with the same name
        (compared case-insensitively).
    */
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(existing) => *existing = (name, value),
            None => self.headers.push((name, value)),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/**
    Performs the actual license server round trip.

    Called on the session worker thread; blocking is expected. Timeouts
    are the transport's own concern.
*/
pub trait LicenseTransport: Send + Sync {
    fn execute(&self, request: LicenseRequest) -> Result<Vec<u8>, TransportError>;
}

/**
    Hook that sees every license request right before it is sent,
    typically to attach authorization. Returning an error vetoes the request.
*/
pub trait RequestInterceptor: Send + Sync {
    fn intercept(&self, request: &mut LicenseRequest) -> Result<(), TransportError>;
}

impl<F> RequestInterceptor for F
where
    F: Fn(&mut LicenseRequest) -> Result<(), TransportError> + Send + Sync,
{
    fn intercept(&self, request: &mut LicenseRequest) -> Result<(), TransportError> {
        self(request)
    }
}

/**
    HTTP(S) transport over a blocking reqwest client.
*/
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

impl LicenseTransport for HttpTransport {
    fn execute(&self, request: LicenseRequest) -> Result<Vec<u8>, TransportError> {
        let mut builder = self.client.post(&request.url).body(request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: body.to_vec(),
            });
        }

        Ok(body.to_vec())
    }
}

/**
    License exchange as seen by the session worker: resolves the server
    URL, attaches headers, runs the interceptor and hands off to the
    transport.
*/
#[derive(Clone)]
pub struct LicenseClient {
    transport: Arc<dyn LicenseTransport>,
    interceptor: Option<Arc<dyn RequestInterceptor>>,
    server_url: Option<String>,
    headers: Vec<(String, String)>,
}

impl LicenseClient {
    pub fn new(
        transport: Arc<dyn LicenseTransport>,
        interceptor: Option<Arc<dyn RequestInterceptor>>,
        server_url: Option<String>,
        headers: Vec<(String, String)>,
    ) -> Self {
        Self {
            transport,
            interceptor,
            server_url,
            headers,
        }
    }

    /**
        Assemble the request for a provider key request without sending it.
    */
    pub fn prepare(
        &self,
        scheme: ProtectionScheme,
        session_id: &SessionId,
        key_request: &KeyRequest,
    ) -> Result<LicenseRequest, TransportError> {
        let url = self
            .server_url
            .clone()
            .filter(|u| !u.is_empty())
            .or_else(|| key_request.default_url.clone().filter(|u| !u.is_empty()))
            .ok_or(TransportError::NoServerUrl)?;

        let mut request = LicenseRequest {
            scheme,
            session_id: session_id.clone(),
            url,
            headers: Vec::new(),
            body: key_request.data.clone(),
        };

        match scheme {
            ProtectionScheme::PlayReady => {
                request.set_header("Content-Type", "text/xml; charset=utf-8");
                request.set_header("SOAPAction", PLAYREADY_SOAP_ACTION);
            }
            _ => request.set_header("Content-Type", "application/octet-stream"),
        }
        for (name, value) in &self.headers {
            request.set_header(name.clone(), value.clone());
        }

        if let Some(interceptor) = &self.interceptor {
            interceptor.intercept(&mut request)?;
        }

        Ok(request)
    }

    pub fn exchange(
        &self,
        scheme: ProtectionScheme,
        session_id: &SessionId,
        key_request: &KeyRequest,
    ) -> Result<Vec<u8>, TransportError> {
        let request = self.prepare(scheme, session_id, key_request)?;
        debug!(
            session = %session_id,
            url = %request.url,
            bytes = request.body.len(),
            "sending license request"
        );
        self.transport.execute(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Capture {
        seen: Mutex<Vec<LicenseRequest>>,
    }

    impl LicenseTransport for Capture {
        fn execute(&self, request: LicenseRequest) -> Result<Vec<u8>, TransportError> {
            self.seen.lock().push(request);
            Ok(b"license".to_vec())
        }
    }

    fn key_request(default_url: Option<&str>) -> KeyRequest {
        KeyRequest {
            data: b"challenge".to_vec(),
            default_url: default_url.map(str::to_owned),
        }
    }

    fn sid() -> SessionId {
        SessionId::new(vec![7])
    }

    #[test]
    fn configured_url_wins_over_suggestion() {
        let client = LicenseClient::new(
            Arc::new(Capture::default()),
            None,
            Some("https://license.example/wv".into()),
            Vec::new(),
        );
        let req = client
            .prepare(
                ProtectionScheme::Widevine,
                &sid(),
                &key_request(Some("https://suggested.example")),
            )
            .unwrap();
        assert_eq!(req.url, "https://license.example/wv");
        assert_eq!(req.header("content-type"), Some("application/octet-stream"));
        assert_eq!(req.body, b"challenge");
    }

    #[test]
    fn falls_back_to_provider_suggestion() {
        let client = LicenseClient::new(Arc::new(Capture::default()), None, None, Vec::new());
        let req = client
            .prepare(
                ProtectionScheme::PlayReady,
                &sid(),
                &key_request(Some("https://suggested.example")),
            )
            .unwrap();
        assert_eq!(req.url, "https://suggested.example");
        assert_eq!(req.header("Content-Type"), Some("text/xml; charset=utf-8"));
        assert!(req.header("soapaction").is_some());
    }

    #[test]
    fn no_url_anywhere_is_an_error() {
        let client = LicenseClient::new(
            Arc::new(Capture::default()),
            None,
            Some(String::new()),
            Vec::new(),
        );
        let err = client
            .prepare(ProtectionScheme::Widevine, &sid(), &key_request(None))
            .unwrap_err();
        assert_eq!(err, TransportError::NoServerUrl);
    }

    #[test]
    fn caller_headers_override_defaults() {
        let client = LicenseClient::new(
            Arc::new(Capture::default()),
            None,
            Some("https://license.example".into()),
            vec![
                ("content-type".into(), "application/json".into()),
                ("X-Custom".into(), "1".into()),
            ],
        );
        let req = client
            .prepare(ProtectionScheme::Widevine, &sid(), &key_request(None))
            .unwrap();
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.header("x-custom"), Some("1"));
        assert_eq!(req.headers.len(), 2);
    }

    #[test]
    fn interceptor_can_modify_and_veto() {
        let capture = Arc::new(Capture::default());
        let authorize = |req: &mut LicenseRequest| -> Result<(), TransportError> {
            req.set_header("Authorization", "Bearer token");
            Ok(())
        };
        let client = LicenseClient::new(
            capture.clone(),
            Some(Arc::new(authorize)),
            Some("https://license.example".into()),
            Vec::new(),
        );
        let response = client
            .exchange(ProtectionScheme::Widevine, &sid(), &key_request(None))
            .unwrap();
        assert_eq!(response, b"license");
        let seen = capture.seen.lock();
        assert_eq!(seen[0].header("authorization"), Some("Bearer token"));
        drop(seen);

        let veto = |_: &mut LicenseRequest| -> Result<(), TransportError> {
            Err(TransportError::Rejected("no token".into()))
        };
        let client = LicenseClient::new(
            capture.clone(),
            Some(Arc::new(veto)),
            Some("https://license.example".into()),
            Vec::new(),
        );
        let err = client
            .exchange(ProtectionScheme::Widevine, &sid(), &key_request(None))
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
        assert_eq!(capture.seen.lock().len(), 1);
    }
}
