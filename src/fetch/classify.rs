//! Resource classification for intercepted requests.
//!
//! The classification rule is part of the external interface and must
//! stay stable: collaborators rely on which namespace a resource lands
//! in. Evaluation order is DATA, DOCUMENT, STATIC, then OTHER.

use url::Url;

use crate::config::WorkerConfig;
use crate::store::Partition;

/// What the page intends to do with the response, as reported by the
/// platform alongside the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    Document,
    Style,
    Script,
    Font,
    Image,
    #[default]
    Other,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    pub destination: Destination,
    pub is_navigation: bool,
}

impl FetchRequest {
    /// Plain GET for a subresource.
    pub fn get(url: &str) -> Self {
        Self {
            url: url.to_string(),
            method: "GET".to_string(),
            destination: Destination::Other,
            is_navigation: false,
        }
    }

    /// Top-level HTML navigation.
    pub fn navigation(url: &str) -> Self {
        Self {
            url: url.to_string(),
            method: "GET".to_string(),
            destination: Destination::Document,
            is_navigation: true,
        }
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_string();
        self
    }

    /// Only same-process GET requests over http(s) are intercepted;
    /// everything else passes through untouched.
    pub fn is_interceptable(&self) -> bool {
        if !self.method.eq_ignore_ascii_case("GET") {
            return false;
        }
        match Url::parse(&self.url) {
            Ok(url) => matches!(url.scheme(), "http" | "https"),
            // A bare path has no scheme and is served by the origin.
            Err(_) => self.url.starts_with('/'),
        }
    }
}

/// Resource classes routed to strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Static,
    Data,
    Document,
    Other,
}

/// Classify an intercepted request.
pub fn classify(request: &FetchRequest, config: &WorkerConfig) -> RequestClass {
    let (path, host) = split_url(&request.url);

    let is_data = path.ends_with(".json")
        || path.contains("/logs/")
        || path.contains("/api/")
        || host.as_deref() == Some(config.weather_host.as_str());
    if is_data {
        return RequestClass::Data;
    }

    let is_document = path.ends_with(".html") || path.ends_with('/') || request.is_navigation;
    if is_document {
        return RequestClass::Document;
    }

    let is_static = matches!(
        request.destination,
        Destination::Style | Destination::Script | Destination::Font
    ) || host
        .as_deref()
        .is_some_and(|h| config.cdn_hosts.iter().any(|cdn| cdn == h));
    if is_static {
        return RequestClass::Static;
    }

    RequestClass::Other
}

/// Namespace partition each class is cached in.
pub fn partition_for(class: RequestClass) -> Partition {
    match class {
        RequestClass::Static => Partition::Static,
        RequestClass::Data => Partition::Data,
        RequestClass::Document | RequestClass::Other => Partition::Dynamic,
    }
}

fn split_url(raw: &str) -> (String, Option<String>) {
    match Url::parse(raw) {
        Ok(url) => (
            url.path().to_string(),
            url.host_str().map(|h| h.to_string()),
        ),
        // Site-relative path; strip any query manually.
        Err(_) => {
            let path = raw.split(['?', '#']).next().unwrap_or(raw);
            (path.to_string(), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WorkerConfig {
        WorkerConfig::default()
    }

    #[test]
    fn test_json_paths_are_data() {
        let req = FetchRequest::get("https://pirogue.app/data.json");
        assert_eq!(classify(&req, &config()), RequestClass::Data);
    }

    #[test]
    fn test_logs_and_api_paths_are_data() {
        for url in [
            "https://pirogue.app/logs/stats/dakar.json?v=123",
            "https://pirogue.app/api/data",
            "https://pirogue.app/api/run-script",
        ] {
            assert_eq!(classify(&FetchRequest::get(url), &config()), RequestClass::Data);
        }
    }

    #[test]
    fn test_weather_host_is_data() {
        let req = FetchRequest::get("https://marine-api.open-meteo.com/v1/marine?lat=14.7");
        assert_eq!(classify(&req, &config()), RequestClass::Data);
    }

    #[test]
    fn test_html_and_navigations_are_documents() {
        assert_eq!(
            classify(&FetchRequest::get("https://pirogue.app/about.html"), &config()),
            RequestClass::Document
        );
        assert_eq!(
            classify(&FetchRequest::get("https://pirogue.app/"), &config()),
            RequestClass::Document
        );
        assert_eq!(
            classify(&FetchRequest::navigation("https://pirogue.app/zones"), &config()),
            RequestClass::Document
        );
    }

    #[test]
    fn test_asset_destinations_are_static() {
        for destination in [Destination::Style, Destination::Script, Destination::Font] {
            let req = FetchRequest::get("https://pirogue.app/assets/app-bundle")
                .with_destination(destination);
            assert_eq!(classify(&req, &config()), RequestClass::Static);
        }
    }

    #[test]
    fn test_cdn_hosts_are_static() {
        let req = FetchRequest::get("https://cdn-icons-png.flaticon.com/128/2965/2965315.png");
        assert_eq!(classify(&req, &config()), RequestClass::Static);
    }

    #[test]
    fn test_data_wins_over_document_and_static() {
        // A .json navigation is still DATA: rule order is fixed.
        let req = FetchRequest::navigation("https://pirogue.app/manifest.json");
        assert_eq!(classify(&req, &config()), RequestClass::Data);

        // A script served from the weather host is DATA too.
        let req = FetchRequest::get("https://marine-api.open-meteo.com/sdk.js")
            .with_destination(Destination::Script);
        assert_eq!(classify(&req, &config()), RequestClass::Data);
    }

    #[test]
    fn test_everything_else_is_other() {
        let req = FetchRequest::get("https://pirogue.app/photos/pirogue.jpg")
            .with_destination(Destination::Image);
        assert_eq!(classify(&req, &config()), RequestClass::Other);
    }

    #[test]
    fn test_relative_paths_classify() {
        assert_eq!(
            classify(&FetchRequest::get("/api/data"), &config()),
            RequestClass::Data
        );
        assert_eq!(
            classify(&FetchRequest::get("/index.html"), &config()),
            RequestClass::Document
        );
    }

    #[test]
    fn test_non_get_not_interceptable() {
        let req = FetchRequest::get("https://pirogue.app/api/run-script").with_method("POST");
        assert!(!req.is_interceptable());
    }

    #[test]
    fn test_non_http_scheme_not_interceptable() {
        assert!(!FetchRequest::get("chrome-extension://abc/script.js").is_interceptable());
        assert!(!FetchRequest::get("data:text/plain,hello").is_interceptable());
        assert!(FetchRequest::get("https://pirogue.app/").is_interceptable());
        assert!(FetchRequest::get("/api/data").is_interceptable());
    }

    #[test]
    fn test_partition_routing() {
        assert_eq!(partition_for(RequestClass::Static), Partition::Static);
        assert_eq!(partition_for(RequestClass::Data), Partition::Data);
        assert_eq!(partition_for(RequestClass::Document), Partition::Dynamic);
        assert_eq!(partition_for(RequestClass::Other), Partition::Dynamic);
    }
}
