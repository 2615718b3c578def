// HTTP transport backed by reqwest.
// Turns a request descriptor into a GET call and classifies the response.

use async_trait::async_trait;
use reqwest::{
    Client, Response, StatusCode, Url,
    header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT},
};
use tracing::debug;

use crate::error::TransportError;

use super::transport::Transport;
use super::types::{FetchRequest, FetchResponse, ListingBody, RequestTarget};

pub const SESSION_HEADER: &str = "x-session";
pub const STORE_ID_HEADER: &str = "x-store-id";
pub const GEO_HEADER: &str = "x-geo-hash";

/// JSON-over-HTTP transport.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport with default headers.
    pub fn new() -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("catalog-cache/", env!("CARGO_PKG_VERSION"))),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Check response status and convert errors.
    fn check_response(response: Response) -> Result<Response, TransportError> {
        match response.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED => Ok(response),
            status => Err(TransportError::from_status(status.as_u16())),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, TransportError> {
        let url = request_url(&request)?;
        debug!(%url, "Fetching");

        let mut builder = self
            .client
            .get(url)
            .query(&query_params(&request))
            .timeout(request.timeout)
            .header(ACCEPT_LANGUAGE, request.metadata.accept_language.as_str());
        if let Some(session) = &request.metadata.session {
            builder = builder.header(SESSION_HEADER, session.as_str());
        }
        if let Some(store_id) = &request.metadata.store_id {
            builder = builder.header(STORE_ID_HEADER, store_id.as_str());
        }
        if let Some(geo) = &request.metadata.geo {
            builder = builder.header(GEO_HEADER, geo.as_str());
        }

        let response = Self::check_response(builder.send().await?)?;
        let store_id = response
            .headers()
            .get(STORE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let text = response.text().await?;
        let body: ListingBody =
            serde_json::from_str(&text).map_err(|e| TransportError::Parse(e.to_string()))?;

        Ok(FetchResponse { body, store_id })
    }
}

/// Build the request URL: entry point, command, then search path segments.
pub fn request_url(request: &FetchRequest) -> Result<Url, TransportError> {
    let mut url = Url::parse(&request.entry_point)
        .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", request.entry_point, e)))?;

    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(request.entry_point.clone()))?;
        segments.pop_if_empty().push(&request.command);
        if let RequestTarget::Search {
            category,
            subcategory,
            ..
        } = &request.target
        {
            if let Some(category) = category {
                segments.push(category);
                if let Some(subcategory) = subcategory {
                    segments.push(subcategory);
                }
            }
        }
    }

    Ok(url)
}

/// Query parameters for a request, in a stable order.
pub fn query_params(request: &FetchRequest) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();

    let selectors = [
        ("node", &request.node),
        ("lang", &request.lang),
        ("portal", &request.portal),
        ("space", &request.space),
        ("order", &request.order_by),
    ];
    for (name, value) in selectors {
        if let Some(value) = value {
            params.push((name, value.clone()));
        }
    }

    match &request.target {
        RequestTarget::Catalog { properties } => {
            params.push(("props", properties.join(",")));
        }
        RequestTarget::Search { query, gtin, .. } => {
            params.push(("q", query.clone()));
            if *gtin {
                params.push(("gtin", "true".to_string()));
            }
        }
    }

    if let Some(range) = request.range {
        params.push(("start", range.start.to_string()));
        params.push(("max", range.max.to_string()));
    }

    params
}
