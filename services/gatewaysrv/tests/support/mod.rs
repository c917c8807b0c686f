//! In-process Modbus TCP slave and config fixtures for integration tests

#![allow(dead_code)]
#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Holding registers shared by every connection of one slave
pub struct ModbusSlave {
    pub addr: SocketAddr,
    registers: Arc<Mutex<Vec<u16>>>,
    task: JoinHandle<()>,
}

impl ModbusSlave {
    pub async fn spawn(registers: Vec<u16>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let registers = Arc::new(Mutex::new(registers));

        let shared = registers.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, shared.clone()));
            }
        });
        Self {
            addr,
            registers,
            task,
        }
    }

    pub fn register(&self, index: usize) -> u16 {
        self.registers.lock()[index]
    }

    pub fn set_register(&self, index: usize, value: u16) {
        self.registers.lock()[index] = value;
    }
}

impl Drop for ModbusSlave {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: TcpStream, registers: Arc<Mutex<Vec<u16>>>) {
    loop {
        let mut header = [0u8; 7];
        if stream.read_exact(&mut header).await.is_err() {
            return;
        }
        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
        let mut pdu = vec![0u8; length.saturating_sub(1)];
        if stream.read_exact(&mut pdu).await.is_err() {
            return;
        }

        let reply_pdu = handle(&pdu, &registers);
        let mut frame = header[..4].to_vec();
        frame.extend_from_slice(&((reply_pdu.len() + 1) as u16).to_be_bytes());
        frame.push(header[6]);
        frame.extend_from_slice(&reply_pdu);
        if stream.write_all(&frame).await.is_err() {
            return;
        }
    }
}

fn word(pdu: &[u8], at: usize) -> usize {
    u16::from_be_bytes([pdu[at], pdu[at + 1]]) as usize
}

fn handle(pdu: &[u8], registers: &Mutex<Vec<u16>>) -> Vec<u8> {
    let function = pdu[0];
    let mut registers = registers.lock();
    match function {
        0x03 | 0x04 => {
            let (start, count) = (word(pdu, 1), word(pdu, 3));
            if start + count > registers.len() {
                return vec![function | 0x80, 0x02];
            }
            let mut reply = vec![function, (count * 2) as u8];
            for value in &registers[start..start + count] {
                reply.extend_from_slice(&value.to_be_bytes());
            }
            reply
        },
        0x06 => {
            registers[word(pdu, 1)] = word(pdu, 3) as u16;
            pdu[..5].to_vec()
        },
        0x10 => {
            let (start, count) = (word(pdu, 1), word(pdu, 3));
            for i in 0..count {
                registers[start + i] = word(pdu, 6 + i * 2) as u16;
            }
            pdu[..5].to_vec()
        },
        _ => vec![function | 0x80, 0x01],
    }
}

/// Network Modbus TCP port entry for `PORTConfig.json`
pub fn port_json(name: &str, addr: SocketAddr, valid: bool) -> serde_json::Value {
    serde_json::json!({
        "PortName": name,
        "Vaild": valid,
        "PortType": 2,
        "DeviceType": 3005,
        "Param": {
            "IP": addr.ip().to_string(),
            "PortNumber": addr.port(),
            "RespTimeOutMs": 500,
            "SampleIntervalS": 1
        }
    })
}

pub fn write_config(
    dir: &Path,
    ports: Vec<serde_json::Value>,
    devices: serde_json::Value,
    variables: serde_json::Value,
) {
    let write = |name: &str, value: serde_json::Value| {
        std::fs::write(dir.join(name), serde_json::to_string_pretty(&value).unwrap()).unwrap();
    };
    write("PORTConfig.json", serde_json::json!({ "PORTConfigs": ports }));
    write("DEVConfig.json", devices);
    write("VARConfig.json", variables);
}

/// Poll `check` until it holds or `timeout` passes
pub async fn eventually<F: FnMut() -> bool>(timeout: Duration, mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
