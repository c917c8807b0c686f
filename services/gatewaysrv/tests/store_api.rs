//! Store and HTTP API over two live ports

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

mod support;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;

use gatewaysrv::api::create_api_routes;
use gatewaysrv::core::config::DataPointConfig;
use gatewaysrv::service::DataPointStore;
use support::{eventually, port_json, write_config, ModbusSlave};

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn send(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_two_ports_through_the_api() {
    let north = ModbusSlave::spawn(vec![11, 12, 0, 0]).await;
    let south = ModbusSlave::spawn(vec![21, 22, 0, 0]).await;

    let mut link_port = port_json("LINK", north.addr, true);
    link_port["DeviceType"] = json!(3008);

    let dir = tempfile::tempdir().unwrap();
    write_config(
        dir.path(),
        vec![
            port_json("NORTH", north.addr, true),
            port_json("SOUTH", south.addr, true),
            port_json("SPARE", south.addr, false),
            link_port,
        ],
        json!({"DEVConfigs": [
            {"PortName": "NORTH", "DevList": [{"DevName": "pump", "DevAddr": 1}]},
            {"PortName": "SOUTH", "DevList": [{"DevName": "fan", "DevAddr": 2}]},
            {"PortName": "SPARE", "DevList": [{"DevName": "idle", "DevAddr": 3}]}
        ]}),
        json!({"VARConfigs": [
            {"PortName": "NORTH", "DevName": "pump", "VarList": [
                {"Name": "speed", "DataType": 2, "Param": {"RegAddr": 0, "RegType": 3}},
                {"Name": "load", "DataType": 2, "Param": {"RegAddr": 1, "RegType": 3}}
            ]},
            {"PortName": "SOUTH", "DevName": "fan", "VarList": [
                {"Name": "speed", "DataType": 2, "Param": {"RegAddr": 0, "RegType": 3}},
                {"Name": "target", "DataType": 2, "Param": {"RegAddr": 1, "RegType": 6}}
            ]},
            {"PortName": "SPARE", "DevName": "idle", "VarList": [
                {"Name": "unused", "DataType": 2, "Param": {"RegAddr": 0, "RegType": 3}}
            ]}
        ]}),
    );

    let config = DataPointConfig::load(dir.path()).unwrap();
    let store = Arc::new(DataPointStore::from_config(&config).unwrap());
    assert_eq!(store.points().len(), 2);

    let token = CancellationToken::new();
    let handles = store.start(token.clone());
    let app = create_api_routes(store.clone());

    let sampled = eventually(Duration::from_secs(5), || {
        store.get_store().iter().all(|entry| entry.value.is_some())
    })
    .await;
    assert!(sampled);

    let (status, tree) = get(&app, "/v1/getAllVariables").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        tree,
        json!({
            "NORTH": {"pump": {"speed": 11.0, "load": 12.0}},
            "SOUTH": {"fan": {"speed": 21.0, "target": 22.0}}
        })
    );

    let (_, flat) = get(&app, "/v2/getAllVariables").await;
    let ret = flat["ret"].as_array().unwrap();
    assert_eq!(ret.len(), 4);
    assert_eq!(ret[2]["portName"], "SOUTH");
    assert_eq!(ret[2]["deviceName"], "fan");

    // Ids run across ports in file order: SOUTH/fan/target is 4
    let (status, body) = send(&app, "POST", "/v1/variables/4", json!({"value": 30})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], 30.0);
    assert_eq!(south.register(1), 30);
    assert_eq!(north.register(1), 12);

    // Same name on both ports resolves per port
    north.set_register(0, 15);
    let (_, body) = get(&app, "/v1/ports/NORTH/devices/pump/variables/speed?realTime=true").await;
    assert_eq!(body["value"], 15.0);
    let (_, body) = get(&app, "/v1/ports/SOUTH/devices/fan/variables/speed").await;
    assert_eq!(body["value"], 21.0);

    // Disabled port was never built
    let (status, _) = get(&app, "/v1/ports/SPARE/devices/idle/variables/unused").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, ports) = get(&app, "/v1/ports").await;
    let names: Vec<_> = ports
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["portName"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["NORTH", "SOUTH"]);
    assert_eq!(ports[0]["state"], "connected");

    token.cancel();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
