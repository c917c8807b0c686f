//! HTTP handlers
//!
//! Thin adapters: every handler resolves to one store call. Lookup failures
//! become 404, failed writes 500, failed reads a `null` value.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::models::{
    AllVariablesResponse, LogLevelResponse, ReadQuery, SetLogLevelRequest, ValueResponse,
    WriteRequest,
};
use crate::drivers::LinkStatus;
use crate::service::DataPointStore;
use common::AppError;

type Store = State<Arc<DataPointStore>>;

/// port → device → variable → value
pub type VariableTree = BTreeMap<String, BTreeMap<String, BTreeMap<String, Option<f64>>>>;

/// Liveness check
pub async fn check_connect() -> Json<serde_json::Value> {
    Json(serde_json::Value::Null)
}

pub async fn get_all_variables_v1(State(store): Store) -> Json<VariableTree> {
    let mut tree = VariableTree::new();
    for entry in store.get_store() {
        tree.entry(entry.port_name)
            .or_default()
            .entry(entry.device_name)
            .or_default()
            .insert(entry.variable_name, entry.value);
    }
    Json(tree)
}

pub async fn get_all_variables_v2(State(store): Store) -> Json<AllVariablesResponse> {
    Json(AllVariablesResponse {
        ret: store.get_store(),
    })
}

pub async fn read_variable(
    State(store): Store,
    Path(id): Path<i64>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<ValueResponse>, AppError> {
    let value = store.read_by_id(id, query.real_time).await?;
    Ok(Json(ValueResponse { value }))
}

pub async fn write_variable(
    State(store): Store,
    Path(id): Path<i64>,
    Json(request): Json<WriteRequest>,
) -> Result<Json<ValueResponse>, AppError> {
    debug!(id, value = request.value, "Write by id");
    let value = store.write_by_id(id, request.value).await?;
    Ok(Json(ValueResponse { value }))
}

pub async fn read_variable_by_name(
    State(store): Store,
    Path((port, device, variable)): Path<(String, String, String)>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<ValueResponse>, AppError> {
    let value = store
        .read(&port, &device, &variable, query.real_time)
        .await?;
    Ok(Json(ValueResponse { value }))
}

pub async fn write_variable_by_name(
    State(store): Store,
    Path((port, device, variable)): Path<(String, String, String)>,
    Json(request): Json<WriteRequest>,
) -> Result<Json<ValueResponse>, AppError> {
    debug!(
        port = %port,
        device = %device,
        variable = %variable,
        value = request.value,
        "Write by name"
    );
    let value = store.write(&port, &device, &variable, request.value).await?;
    Ok(Json(ValueResponse { value }))
}

/// Link state of every port
pub async fn list_ports(State(store): Store) -> Json<Vec<LinkStatus>> {
    Json(store.port_status().await)
}

pub async fn get_log_level() -> Json<LogLevelResponse> {
    Json(LogLevelResponse {
        level: common::logging::get_log_level(),
    })
}

pub async fn set_log_level(
    Json(request): Json<SetLogLevelRequest>,
) -> Result<Json<LogLevelResponse>, AppError> {
    common::logging::set_log_level(&request.level).map_err(AppError::bad_request)?;
    Ok(Json(LogLevelResponse {
        level: request.level,
    }))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::api::create_api_routes;
    use crate::core::config::loader::DataPointConfig;
    use crate::core::config::types::{DeviceConfig, PortDevices, VariableGroup};
    use crate::core::transport::MockTransport;
    use crate::drivers::{connect, Link, ModbusDriver};
    use crate::protocols::modbus::ModbusMode;
    use crate::service::store::tests::{port, variable};
    use crate::service::DataPoint;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use std::time::Duration;
    use tower::util::ServiceExt;

    async fn app() -> (Router, Arc<DataPointStore>, MockTransport) {
        let config = DataPointConfig {
            ports: vec![port("P1", true)],
            devices: vec![PortDevices {
                port_name: "P1".to_string(),
                dev_list: vec![DeviceConfig {
                    dev_name: "meter".to_string(),
                    dev_addr: 1,
                    ..Default::default()
                }],
            }],
            variables: vec![VariableGroup {
                port_name: "P1".to_string(),
                dev_name: "meter".to_string(),
                var_list: vec![variable(1, "volt", 0), variable(2, "amp", 1)],
            }],
        };
        let mock = MockTransport::new("mock");
        let link = Link::new("P1", Box::new(mock.clone())).with_throttle(Duration::ZERO);
        let driver = Arc::new(ModbusDriver::with_link(ModbusMode::Tcp, link));
        connect(driver.as_ref()).await.unwrap();

        let point = DataPoint::new(config.ports[0].clone(), &config, driver);
        let store = Arc::new(DataPointStore::new(vec![point]));
        (create_api_routes(store.clone()), store, mock)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<&str>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            },
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_check_connect() {
        let (app, _, _) = app().await;
        let (status, body) = send(&app, "GET", "/v1/checkConnect", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn test_get_all_variables() {
        let (app, store, _) = app().await;
        store.find_variable_by_id(1).unwrap().variable.record(Some(230.5));

        let (status, body) = send(&app, "GET", "/v1/getAllVariables", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["P1"]["meter"]["volt"], 230.5);
        assert!(body["P1"]["meter"]["amp"].is_null());

        let (status, body) = send(&app, "GET", "/v2/getAllVariables", None).await;
        assert_eq!(status, StatusCode::OK);
        let ret = body["ret"].as_array().unwrap();
        assert_eq!(ret.len(), 2);
        assert_eq!(ret[0]["variableName"], "volt");
        assert_eq!(ret[0]["value"], 230.5);
        assert!(ret[0]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_read_by_id() {
        let (app, store, mock) = app().await;
        store.find_variable_by_id(2).unwrap().variable.record(Some(4.0));

        let (status, body) = send(&app, "GET", "/v1/variables/2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["value"], 4.0);

        mock.push_reply(vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x00, 0x05])
            .await;
        let (_, body) = send(&app, "GET", "/v1/variables/2?realTime=true", None).await;
        assert_eq!(body["value"], 5.0);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let (app, _, _) = app().await;
        let (status, body) = send(&app, "GET", "/v1/variables/99", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["message"], "variable name is not found");
    }

    #[tokio::test]
    async fn test_write_by_id_returns_read_back() {
        let (app, _, mock) = app().await;
        mock.push_reply(vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x10, 0x00, 0x00, 0x00, 0x01])
            .await;
        mock.push_reply(vec![0x00, 0x02, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x00, 0x07])
            .await;

        let (status, body) = send(&app, "POST", "/v1/variables/1", Some(r#"{"value": 7}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["value"], 7.0);
    }

    #[tokio::test]
    async fn test_failed_write_is_server_error() {
        let (app, _, _) = app().await;
        let (status, body) = send(&app, "POST", "/v1/variables/1", Some(r#"{"value": 1}"#)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_by_name_routes() {
        let (app, store, mock) = app().await;
        store.find_variable_by_id(1).unwrap().variable.record(Some(1.5));

        let (status, body) = send(&app, "GET", "/v1/ports/P1/devices/meter/variables/volt", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["value"], 1.5);

        let (status, _) = send(&app, "GET", "/v1/ports/P1/devices/meter/variables/none", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        mock.push_reply(vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x10, 0x00, 0x01, 0x00, 0x01])
            .await;
        mock.push_reply(vec![0x00, 0x02, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x00, 0x03])
            .await;
        let (status, body) = send(
            &app,
            "PUT",
            "/v1/ports/P1/devices/meter/variables/amp",
            Some(r#"{"value": 3}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["value"], 3.0);
    }

    #[tokio::test]
    async fn test_list_ports() {
        let (app, _, _) = app().await;
        let (status, body) = send(&app, "GET", "/v1/ports", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["portName"], "P1");
        assert_eq!(body[0]["state"], "connected");
    }

    #[tokio::test]
    async fn test_invalid_log_level_rejected() {
        let (app, _, _) = app().await;
        let (status, _) = send(&app, "GET", "/v1/log/level", None).await;
        assert_eq!(status, StatusCode::OK);

        // Reload support is only installed by the binary's logging init
        let (status, body) =
            send(&app, "PUT", "/v1/log/level", Some(r#"{"level": "debug"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], 400);
    }
}
