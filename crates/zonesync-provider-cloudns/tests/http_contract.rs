//! HTTP Contract Test: ClouDNS API
//!
//! Runs the adapter against a local mock of the ClouDNS API.
//!
//! Constraints verified:
//! - Every request carries the auth parameters and the zone name
//! - Fetched records keep their native id and are deleted/modified by it
//! - `"status": "Failed"` answers are errors even with HTTP 200
//! - DNSSEC state is read from the DS endpoint
//! - A full reconciliation issues exactly the expected API calls

use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zonesync_core::capability::TtlPolicy;
use zonesync_core::config::{EngineConfig, ProviderConfig, RecordSpec, ZoneConfig, ZonesyncConfig};
use zonesync_core::engine::{Mode, Reconciler};
use zonesync_core::record::{RecordConfig, RecordData};
use zonesync_core::{DnsProvider, Error, ProviderRegistry};
use zonesync_provider_cloudns::CloudnsProvider;

const ZONE: &str = "example.com";

fn provider(server: &MockServer) -> CloudnsProvider {
    CloudnsProvider::new(Some("1234".to_string()), None, "pw", Some(server.uri())).expect("valid credentials")
}

fn two_records() -> serde_json::Value {
    json!({
        "101": {"id": "101", "type": "A", "host": "www", "record": "192.0.2.1", "ttl": "3600", "status": 1},
        "102": {"id": "102", "type": "A", "host": "old", "record": "192.0.2.99", "ttl": "3600", "status": 1}
    })
}

async fn mount_records(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/records.json"))
        .and(query_param("auth-id", "1234"))
        .and(query_param("auth-password", "pw"))
        .and(query_param("domain-name", ZONE))
        .respond_with(ResponseTemplate::new(200).set_body_json(two_records()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn fetch_maps_native_records() {
    let server = MockServer::start().await;
    mount_records(&server).await;

    let records = provider(&server).get_zone_records(ZONE).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].fqdn(), "www.example.com");
    assert_eq!(records[0].ttl(), 3600);
    assert_eq!(records[0].data(), &RecordData::a("192.0.2.1"));
    assert!(records[0].origin().is_some());
}

#[tokio::test]
async fn fetch_of_empty_zone() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/records.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    assert!(provider(&server).get_zone_records(ZONE).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/records.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "Failed",
            "statusDescription": "Invalid authentication, incorrect auth-id or auth-password."
        })))
        .mount(&server)
        .await;

    match provider(&server).get_zone_records(ZONE).await {
        Err(Error::Fetch(message)) => {
            assert!(message.contains("Invalid authentication"));
            assert!(!message.contains("pw"));
        }
        other => panic!("expected fetch error, got {:?}", other),
    }
}

#[tokio::test]
async fn server_errors_are_reported_as_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/activate-dnssec.json"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    match provider(&server).set_dnssec(ZONE, true).await {
        Err(Error::Provider { message, .. }) => assert!(message.contains("transient")),
        other => panic!("expected provider error, got {:?}", other),
    }
}

#[tokio::test]
async fn ttl_policy_comes_from_available_ttls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get-available-ttl.json"))
        .and(query_param("domain-name", ZONE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([60, 300, 3600, 86400])))
        .mount(&server)
        .await;

    let policy = provider(&server).ttl_policy(ZONE).await.unwrap();

    assert_eq!(policy, TtlPolicy::allowed([60, 300, 3600, 86400]));
    assert_eq!(policy.normalize(100), 300);
    assert_eq!(policy.normalize(100_000), 86400);
}

#[tokio::test]
async fn create_sends_encoded_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/add-record.json"))
        .and(query_param("domain-name", ZONE))
        .and(query_param("record-type", "MX"))
        .and(query_param("host", ""))
        .and(query_param("record", "mail.example.com."))
        .and(query_param("priority", "10"))
        .and(query_param("ttl", "3600"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "Success",
            "statusDescription": "The record was added successfully.",
            "data": {"id": 555}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(&server);
    let record = RecordConfig::new("@", ZONE, 3600, RecordData::mx(10, "mail.example.com."));
    let request = provider.encode_record(ZONE, &record).unwrap();

    provider.create_record(ZONE, &request).await.unwrap();
}

#[tokio::test]
async fn delete_and_modify_use_native_id() {
    let server = MockServer::start().await;
    mount_records(&server).await;
    Mock::given(method("POST"))
        .and(path("/delete-record.json"))
        .and(query_param("record-id", "102"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Success"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mod-record.json"))
        .and(query_param("record-id", "101"))
        .and(query_param("ttl", "300"))
        .and(query_param_is_missing("record-type"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Success"})))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(&server);
    let records = provider.get_zone_records(ZONE).await.unwrap();
    let (www, old) = (&records[0], &records[1]);

    provider.delete_record(ZONE, old).await.unwrap();

    let desired = RecordConfig::new("www", ZONE, 300, RecordData::a("192.0.2.1"));
    let request = provider.encode_record(ZONE, &desired).unwrap();
    provider.modify_record(ZONE, www, &request).await.unwrap();
}

#[tokio::test]
async fn dnssec_state_from_ds_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get-dnssec-ds-records.json"))
        .and(query_param("domain-name", "signed.example"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 1,
            "ds": ["signed.example. 3600 IN DS 12345 13 2 ABCDEF"]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/get-dnssec-ds-records.json"))
        .and(query_param("domain-name", ZONE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "Failed",
            "statusDescription": "The DNSSEC is not active."
        })))
        .mount(&server)
        .await;

    let provider = provider(&server);
    assert!(provider.dnssec_enabled("signed.example").await.unwrap());
    assert!(!provider.dnssec_enabled(ZONE).await.unwrap());
}

#[tokio::test]
async fn full_reconciliation_against_api() {
    let server = MockServer::start().await;
    mount_records(&server).await;
    Mock::given(method("GET"))
        .and(path("/get-available-ttl.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([60, 300, 3600])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/delete-record.json"))
        .and(query_param("record-id", "102"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Success"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/add-record.json"))
        .and(query_param("record-type", "TXT"))
        .and(query_param("record", "v=spf1 -all"))
        .and(query_param("ttl", "300"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Success"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mod-record.json"))
        .and(query_param("record-id", "101"))
        .and(query_param("ttl", "300"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Success"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = ZonesyncConfig::new();
    config.providers.insert(
        "main".to_string(),
        ProviderConfig::Cloudns {
            auth_id: Some("1234".to_string()),
            sub_auth_id: None,
            auth_password: "pw".to_string(),
            base_url: Some(server.uri()),
        },
    );
    // 250 is not an allowed ClouDNS TTL and snaps up to 300
    config.zones.push(
        ZoneConfig::new(ZONE, "main")
            .with_record(RecordSpec::new("www", RecordData::a("192.0.2.1")).with_ttl(250))
            .with_record(RecordSpec::new("@", RecordData::txt("v=spf1 -all"))),
    );
    config.validate().unwrap();

    let registry = ProviderRegistry::new();
    zonesync_provider_cloudns::register(&registry);
    let (reconciler, _events) = Reconciler::new(Arc::new(registry), EngineConfig::default()).unwrap();
    let reconciler = Arc::new(reconciler);

    let jobs = reconciler.jobs_from_config(&config, &[]).unwrap();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let results = reconciler.reconcile_all(jobs, Mode::Push, cancel_rx).await;

    let outcome = results[0].1.as_ref().expect("zone reconciles");
    assert_eq!(outcome.plan.change_count, 3);
    assert_eq!(outcome.applied(), 3);
    assert!(outcome.is_success());
}
