// src/handlers/servers.rs
use actix_web::{web, HttpRequest, HttpResponse};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{clock::DefaultClock, RateLimiter};
use log::{debug, error};
use serde::Deserialize;
use std::net::IpAddr;

use crate::models::server::Region;
use crate::search::SearchService;
use crate::utils::{extract_peer_ip, parse_probe_target, RequestError};

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(rename = "appId")]
    app_id: u32,
    region: Option<Region>,
    filter: Option<String>,
}

pub async fn search_servers(
    req: HttpRequest,
    query: web::Query<SearchQuery>,
    service: web::Data<SearchService>,
    rate_limiter: web::Data<RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>>,
) -> Result<HttpResponse, RequestError> {
    let peer_ip = extract_peer_ip(&req)?;
    if rate_limiter.check_key(&peer_ip).is_err() {
        error!("Rate limit exceeded for server search for ip: {}", peer_ip);
        return Err(RequestError::RateLimitExceeded);
    }

    let region = query.region.unwrap_or_default();
    debug!(
        "search request appId={} region={} filter={:?}",
        query.app_id,
        region.as_str(),
        query.filter
    );

    let results = service
        .search(query.app_id, region, query.filter.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(results))
}

#[derive(Deserialize)]
pub struct InfoQuery {
    ip: String,
    port: Option<u16>,
}

pub async fn server_info(
    req: HttpRequest,
    query: web::Query<InfoQuery>,
    service: web::Data<SearchService>,
    rate_limiter: web::Data<RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>>,
) -> Result<HttpResponse, RequestError> {
    let peer_ip = extract_peer_ip(&req)?;
    if rate_limiter.check_key(&peer_ip).is_err() {
        error!("Rate limit exceeded for server info for ip: {}", peer_ip);
        return Err(RequestError::RateLimitExceeded);
    }

    let endpoint = parse_probe_target(&query.ip, query.port)?;
    debug!("info request for {}", endpoint);

    // Transient unreachability is "no data", not an error.
    match service.server_info(&endpoint).await? {
        Some(info) => Ok(HttpResponse::Ok().json(info)),
        None => Ok(HttpResponse::Ok().json(serde_json::Value::Null)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::directory::worker::SessionState;
    use crate::directory::{DirectoryError, DirectorySession};
    use crate::models::server::{Endpoint, ServerInfo};
    use crate::probe::ProbeError;
    use crate::search::ServerProber;
    use actix_web::{test, App};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct StubDirectory(Vec<Endpoint>);

    #[async_trait]
    impl DirectorySession for StubDirectory {
        async fn query(
            &self,
            _app_id: u32,
            _region: Region,
            _filter: Option<&str>,
            _max_results: usize,
        ) -> Result<Vec<Endpoint>, DirectoryError> {
            Ok(self.0.clone())
        }

        async fn heartbeat(&self) -> Result<(), DirectoryError> {
            Ok(())
        }
    }

    /// Answers only for one endpoint; everything else is unreachable.
    struct StubProber(Endpoint, ServerInfo);

    #[async_trait]
    impl ServerProber for StubProber {
        async fn probe(&self, endpoint: &Endpoint) -> Result<Option<ServerInfo>, ProbeError> {
            if *endpoint == self.0 {
                Ok(Some(self.1.clone()))
            } else {
                Ok(None)
            }
        }
    }

    fn sample_info() -> ServerInfo {
        ServerInfo {
            name: "public".to_string(),
            map: "de_dust2".to_string(),
            game: "Counter-Strike".to_string(),
            version: "1.38".to_string(),
            online_players: 12,
            max_players: 16,
            raw: Vec::new(),
        }
    }

    fn gateway(
        candidates: Vec<Endpoint>,
        reachable: Endpoint,
        connected: bool,
    ) -> (web::Data<SearchService>, web::Data<SessionState>) {
        let session = Arc::new(SessionState::new());
        session.set_running(true);
        if connected {
            session.mark_heartbeat();
        }
        let service = SearchService::new(
            Arc::new(StubDirectory(candidates)),
            session.clone(),
            Arc::new(StubProber(reachable, sample_info())),
            &Config::default(),
        );
        (web::Data::new(service), web::Data::from(session))
    }

    fn limiter() -> web::Data<RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>> {
        web::Data::new(RateLimiter::keyed(Config::default().search_quota()))
    }

    #[actix_web::test]
    async fn search_returns_only_public_reachable_servers() {
        let public = Endpoint::new("203.0.113.9", 27015);
        let (service, _) = gateway(
            vec![
                Endpoint::new("10.0.0.1", 27015),
                Endpoint::new("192.168.1.5", 27015),
                public.clone(),
            ],
            public,
            true,
        );
        let app = test::init_service(
            App::new()
                .app_data(service)
                .app_data(limiter())
                .route("/server/search", web::get().to(search_servers)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/server/search?appId=730")
            .peer_addr("198.51.100.1:9999".parse().unwrap())
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let list = body.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["online_players"], 12);
        assert_eq!(list[0]["endpoint"]["ip"], "203.0.113.9");
    }

    #[actix_web::test]
    async fn search_without_session_is_service_unavailable() {
        let public = Endpoint::new("203.0.113.9", 27015);
        let (service, _) = gateway(vec![public.clone()], public, false);
        let app = test::init_service(
            App::new()
                .app_data(service)
                .app_data(limiter())
                .route("/server/search", web::get().to(search_servers)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/server/search?appId=730")
            .peer_addr("198.51.100.1:9999".parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn info_for_unreachable_server_is_null_not_an_error() {
        let reachable = Endpoint::new("203.0.113.9", 27015);
        let (service, _) = gateway(Vec::new(), reachable, true);
        let app = test::init_service(
            App::new()
                .app_data(service)
                .app_data(limiter())
                .route("/server/info", web::get().to(server_info)),
        )
        .await;

        // This endpoint's probe never answers.
        let req = test::TestRequest::get()
            .uri("/server/info?ip=203.0.113.77&port=27015")
            .peer_addr("198.51.100.1:9999".parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body.is_null());
    }

    #[actix_web::test]
    async fn info_accepts_embedded_port_form() {
        let reachable = Endpoint::new("203.0.113.9", 27020);
        let (service, _) = gateway(Vec::new(), reachable, true);
        let app = test::init_service(
            App::new()
                .app_data(service)
                .app_data(limiter())
                .route("/server/info", web::get().to(server_info)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/server/info?ip=203.0.113.9:27020")
            .peer_addr("198.51.100.1:9999".parse().unwrap())
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["online_players"], 12);
        assert_eq!(body["map"], "de_dust2");
    }
}
