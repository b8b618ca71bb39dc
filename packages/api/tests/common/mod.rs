#![allow(dead_code)]

use api::{LabelServer, ServerConfig, init_label_server};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use label_core::{LabelRequest, SignatureGate};

pub const HMAC_SECRET: &str = "test-hmac-secret";
pub const WS_PASSWORD: &str = "test-ws-password";

pub async fn setup_server() -> Result<LabelServer, api::InitError> {
    init_label_server(&ServerConfig::new(HMAC_SECRET, WS_PASSWORD)).await
}

pub fn sample_label() -> LabelRequest {
    LabelRequest {
        human_name: "Ada Lovelace".into(),
        email: "ada@example.com".into(),
        printer_name: "Prusa MK4".into(),
        file_name: "benchy.gcode".into(),
        filament_type: "PLA".into(),
        filament_owner: "Makerspace".into(),
        filament_weight: "12.5".into(),
        time: "1h 20m".into(),
        uuid: "6f1c2b1e-0d2a-4c55-9e57-0b7f8a0f6c11".into(),
        timestamp: 1_700_000_000,
    }
}

/// JSON body for `POST /print`, signed with `secret`.
pub fn signed_body(label: &LabelRequest, secret: &str) -> String {
    let data = B64.encode(serde_json::to_vec(label).unwrap());
    let signature = SignatureGate::new(secret.as_bytes().to_vec())
        .sign(&data)
        .unwrap();
    serde_json::json!({ "data": data, "signature": signature }).to_string()
}
