//! Modbus TCP end to end: config files → store → sampler → slave and back

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

mod support;

use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use gatewaysrv::core::config::DataPointConfig;
use gatewaysrv::service::DataPointStore;
use support::{eventually, port_json, write_config, ModbusSlave};

async fn setup(slave: &ModbusSlave) -> (tempfile::TempDir, DataPointStore) {
    let dir = tempfile::tempdir().unwrap();
    write_config(
        dir.path(),
        vec![port_json("P1", slave.addr, true)],
        json!({"DEVConfigs": [{"PortName": "P1", "DevList": [{"DevName": "meter", "DevAddr": 1}]}]}),
        json!({"VARConfigs": [{"PortName": "P1", "DevName": "meter", "VarList": [
            {"Name": "volt", "DataType": 2, "Decimal": 1, "Modulus": 0.1,
             "Param": {"RegAddr": 0, "RegType": 3}},
            {"Name": "power", "DataType": 8, "Decimal": 2,
             "Param": {"RegAddr": 2, "RegType": 3}},
            {"Name": "setpoint", "DataType": 5,
             "Param": {"RegAddr": 10, "RegType": 6}},
            {"Name": "relay", "DataType": 12,
             "Param": {"RegAddr": 11, "BitAddr": 2, "RegType": 3}}
        ]}]}),
    );
    let config = DataPointConfig::load(dir.path()).unwrap();
    (dir, DataPointStore::from_config(&config).unwrap())
}

fn registers() -> Vec<u16> {
    let mut registers = vec![0u16; 16];
    registers[0] = 2305;
    // 1.5f32 big-endian
    registers[2] = 0x3FC0;
    registers[3] = 0x0000;
    registers[10] = 0xFFFE;
    registers[11] = 0x0001;
    registers
}

#[tokio::test]
async fn test_sampler_fills_store() {
    let slave = ModbusSlave::spawn(registers()).await;
    let (_dir, store) = setup(&slave).await;
    let token = CancellationToken::new();
    let handles = store.start(token.clone());

    let sampled = eventually(Duration::from_secs(5), || {
        store.get_store().iter().all(|entry| entry.value.is_some())
    })
    .await;
    assert!(sampled, "store: {:?}", store.get_store());

    let values: Vec<_> = store.get_store().into_iter().map(|e| e.value).collect();
    assert_eq!(values, vec![Some(230.5), Some(1.5), Some(-2.0), Some(0.0)]);

    // Next sweep picks up a changed register
    slave.set_register(0, 2400);
    let updated = eventually(Duration::from_secs(3), || {
        store.get_store()[0].value == Some(240.0)
    })
    .await;
    assert!(updated);

    store.shutdown();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .unwrap()
            .unwrap();
    }
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn test_writes_reach_the_slave() {
    let slave = ModbusSlave::spawn(registers()).await;
    let (_dir, store) = setup(&slave).await;
    let handles = store.start(CancellationToken::new());

    let connected = eventually(Duration::from_secs(5), || {
        store.get_store()[0].value.is_some()
    })
    .await;
    assert!(connected);

    // FC06 single register, read back live
    assert_eq!(store.write_by_id(3, 42.0).await.unwrap(), Some(42.0));
    assert_eq!(slave.register(10), 42);

    // Bit patched into the current word over FC16
    assert_eq!(store.write("P1", "meter", "relay", 1.0).await.unwrap(), Some(1.0));
    assert_eq!(slave.register(11), 0x0005);

    // Real-time read bypasses the cached sample
    slave.set_register(0, 1000);
    assert_eq!(store.read_by_id(1, true).await.unwrap(), Some(100.0));

    store.shutdown();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_unreachable_slave_yields_no_values() {
    // Bind then drop to get a port nobody listens on
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let dir = tempfile::tempdir().unwrap();
    write_config(
        dir.path(),
        vec![port_json("P1", addr, true)],
        json!({"DEVConfigs": [{"PortName": "P1", "DevList": [{"DevName": "meter", "DevAddr": 1}]}]}),
        json!({"VARConfigs": [{"PortName": "P1", "DevName": "meter", "VarList": [
            {"Name": "volt", "DataType": 2, "Param": {"RegAddr": 0, "RegType": 3}}
        ]}]}),
    );
    let store = DataPointStore::from_config(&DataPointConfig::load(dir.path()).unwrap()).unwrap();
    let handles = store.start(CancellationToken::new());

    let swept = eventually(Duration::from_secs(5), || {
        store.get_store()[0].timestamp.is_some()
    })
    .await;
    assert!(swept);
    assert_eq!(store.get_store()[0].value, None);
    assert_eq!(store.read_by_id(1, true).await.unwrap(), None);
    // Writes to a dead port are skipped, not failed
    assert_eq!(store.write_by_id(1, 1.0).await.unwrap(), None);

    store.shutdown();
    for handle in handles {
        handle.await.unwrap();
    }
}
