// Schema validation tests for MQTT wire format
//
// These tests construct JSON values directly (independent of Rust structs)
// and validate them against the JSON Schema files in schemas/mqtt/.

use serde_json::json;

fn load_schema(name: &str) -> serde_json::Value {
    let path = format!(
        "{}/schemas/mqtt/{name}",
        env!("CARGO_MANIFEST_DIR")
    );
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read schema {path}: {e}"));
    serde_json::from_str(&text)
        .unwrap_or_else(|e| panic!("Failed to parse schema {path}: {e}"))
}

fn build_validator(schema_name: &str) -> jsonschema::Validator {
    let schema = load_schema(schema_name);
    jsonschema::options()
        .with_retriever(LocalRetriever)
        .build(&schema)
        .unwrap_or_else(|e| panic!("Failed to compile schema {schema_name}: {e}"))
}

fn validate(schema_name: &str, instance: &serde_json::Value) {
    let validator = build_validator(schema_name);
    let errors: Vec<_> = validator.iter_errors(instance).collect();
    if !errors.is_empty() {
        let msgs: Vec<String> = errors.iter().map(|e| format!("  - {e}")).collect();
        panic!(
            "Schema validation failed for {schema_name}:\n{}\nInstance: {}",
            msgs.join("\n"),
            serde_json::to_string_pretty(instance).unwrap()
        );
    }
}

fn validate_fails(schema_name: &str, instance: &serde_json::Value) {
    let validator = build_validator(schema_name);
    assert!(
        !validator.is_valid(instance),
        "Expected schema validation to fail for {schema_name}, but it passed.\nInstance: {}",
        serde_json::to_string_pretty(instance).unwrap()
    );
}

// Retriever that loads $ref schemas from the local filesystem
struct LocalRetriever;

impl jsonschema::Retrieve for LocalRetriever {
    fn retrieve(
        &self,
        uri: &jsonschema::Uri<String>,
    ) -> Result<serde_json::Value, Box<dyn std::error::Error + Send + Sync>> {
        let uri_str = uri.as_str();
        let schema_dir = format!("{}/schemas/mqtt/", env!("CARGO_MANIFEST_DIR"));

        // Extract the schema filename from various URI forms:
        // - "json-schema:///point_value.schema.json"
        // - "file:///path/to/point_value.schema.json"
        // - "point_value.schema.json"
        let filename = if let Some(rest) = uri_str.strip_prefix("json-schema:///") {
            rest
        } else if let Some(path) = uri_str.strip_prefix("file://") {
            // For file:// URIs, use the path directly
            let text = std::fs::read_to_string(path)?;
            return Ok(serde_json::from_str(&text)?);
        } else {
            uri_str
        };

        let path = format!("{schema_dir}{filename}");
        if std::path::Path::new(&path).exists() {
            let text = std::fs::read_to_string(&path)?;
            return Ok(serde_json::from_str(&text)?);
        }
        Err(format!("Cannot retrieve schema: {uri_str}").into())
    }
}
// =========================================================================
// Snapshot
// =========================================================================

#[test]
fn snapshot_valid() {
    validate(
        "snapshot.schema.json",
        &json!({
            "now": 1738900000000_u64,
            "op": "SNAPSHOT",
            "connected": true,
            "points": {
                "Battery": 201,
                "Area1_ArmStatus": "Away",
                "Area1_Alarmed": false,
                "Thermo1_CurrentTemp": -4
            }
        }),
    );
}

#[test]
fn snapshot_empty_points() {
    validate(
        "snapshot.schema.json",
        &json!({
            "now": 1738900000000_u64,
            "op": "SNAPSHOT",
            "connected": false,
            "points": {}
        }),
    );
}

#[test]
fn snapshot_wrong_op() {
    validate_fails(
        "snapshot.schema.json",
        &json!({
            "now": 1738900000000_u64,
            "op": "POINT",
            "connected": true,
            "points": {}
        }),
    );
}

#[test]
fn snapshot_missing_points() {
    validate_fails(
        "snapshot.schema.json",
        &json!({ "now": 1738900000000_u64, "op": "SNAPSHOT", "connected": true }),
    );
}

#[test]
fn snapshot_nested_value_rejected() {
    validate_fails(
        "snapshot.schema.json",
        &json!({
            "now": 1738900000000_u64,
            "op": "SNAPSHOT",
            "connected": true,
            "points": { "Battery": { "value": 201 } }
        }),
    );
}

#[test]
fn snapshot_now_as_float_rejected() {
    validate_fails(
        "snapshot.schema.json",
        &json!({
            "now": 1738900000000.5,
            "op": "SNAPSHOT",
            "connected": true,
            "points": {}
        }),
    );
}

// =========================================================================
// Point changes
// =========================================================================

#[test]
fn point_event_bool() {
    validate(
        "point_event.schema.json",
        &json!({
            "now": 1738900000000_u64,
            "op": "POINT",
            "id": 14,
            "name": "Unit1_State",
            "value": true
        }),
    );
}

#[test]
fn point_event_string() {
    validate(
        "point_event.schema.json",
        &json!({
            "now": 1738900000000_u64,
            "op": "POINT",
            "id": 3,
            "name": "Area1_AlarmList",
            "value": "Burglary,Fire"
        }),
    );
}

#[test]
fn point_event_missing_value_rejected() {
    validate_fails(
        "point_event.schema.json",
        &json!({ "now": 1738900000000_u64, "op": "POINT", "id": 3, "name": "Battery" }),
    );
}

#[test]
fn point_event_negative_id_rejected() {
    validate_fails(
        "point_event.schema.json",
        &json!({
            "now": 1738900000000_u64,
            "op": "POINT",
            "id": -1,
            "name": "Battery",
            "value": 200
        }),
    );
}

#[test]
fn point_event_float_value_rejected() {
    validate_fails(
        "point_event.schema.json",
        &json!({
            "now": 1738900000000_u64,
            "op": "POINT",
            "id": 20,
            "name": "Thermo1_CurrentTemp",
            "value": 71.5
        }),
    );
}

// =========================================================================
// User actions and connection events
// =========================================================================

#[test]
fn user_action_button() {
    validate(
        "user_action.schema.json",
        &json!({
            "now": 1738900000000_u64,
            "op": "USER_ACTION",
            "category": "Button",
            "payload": "7"
        }),
    );
}

#[test]
fn user_action_x10() {
    validate(
        "user_action.schema.json",
        &json!({
            "now": 1738900000000_u64,
            "op": "USER_ACTION",
            "category": "X10Code",
            "payload": "On A3"
        }),
    );
}

#[test]
fn user_action_unknown_category_rejected() {
    validate_fails(
        "user_action.schema.json",
        &json!({
            "now": 1738900000000_u64,
            "op": "USER_ACTION",
            "category": "Doorbell",
            "payload": "1"
        }),
    );
}

#[test]
fn connection_events() {
    for op in ["CONNECTED", "DISCONNECTED"] {
        validate(
            "connection_event.schema.json",
            &json!({ "now": 1738900000000_u64, "op": op }),
        );
    }
}

#[test]
fn connection_event_extra_field_rejected() {
    validate_fails(
        "connection_event.schema.json",
        &json!({ "now": 1738900000000_u64, "op": "CONNECTED", "host": "10.0.0.5" }),
    );
}

// =========================================================================
// CMD_ACK
// =========================================================================

#[test]
fn cmd_ack_success_with_src() {
    validate(
        "command_ack.schema.json",
        &json!({
            "now": 1738900000000_u64,
            "op": "CMD_ACK",
            "success": true,
            "src": { "op": "WRITE", "point": "Unit2_Value", "value": 40 }
        }),
    );
}

#[test]
fn cmd_ack_failure_with_error() {
    validate(
        "command_ack.schema.json",
        &json!({
            "now": 1738900000000_u64,
            "op": "CMD_ACK",
            "success": false,
            "src": { "op": "INVOKE", "command": "Arm=Area1,Away,0000" },
            "error": "Invalid security code for area 1"
        }),
    );
}

#[test]
fn cmd_ack_with_snapshot_data() {
    validate(
        "command_ack.schema.json",
        &json!({
            "now": 1738900000000_u64,
            "op": "CMD_ACK",
            "success": true,
            "src": { "op": "SNAPSHOT" },
            "data": {
                "now": 1738900000000_u64,
                "op": "SNAPSHOT",
                "connected": true,
                "points": { "Battery": 190 }
            }
        }),
    );
}

#[test]
fn cmd_ack_missing_success_rejected() {
    validate_fails(
        "command_ack.schema.json",
        &json!({
            "now": 1738900000000_u64,
            "op": "CMD_ACK"
        }),
    );
}

// =========================================================================
// Inbound commands
// =========================================================================

#[test]
fn command_snapshot() {
    validate("command.schema.json", &json!({ "op": "SNAPSHOT" }));
}

#[test]
fn command_ping_with_op_id() {
    validate(
        "command.schema.json",
        &json!({ "op": "PING", "op_id": "abc-123" }),
    );
}

#[test]
fn command_write() {
    validate(
        "command.schema.json",
        &json!({ "op": "WRITE", "point": "Thermo1_Mode", "value": "Cool" }),
    );
}

#[test]
fn command_write_missing_value_rejected() {
    validate_fails(
        "command.schema.json",
        &json!({ "op": "WRITE", "point": "Unit1_State" }),
    );
}

#[test]
fn command_invoke() {
    validate(
        "command.schema.json",
        &json!({ "op": "INVOKE", "command": "UnitDim=Unit4,3,10" }),
    );
}

#[test]
fn command_invoke_missing_command_rejected() {
    validate_fails("command.schema.json", &json!({ "op": "INVOKE" }));
}

#[test]
fn command_unknown_op_rejected() {
    validate_fails("command.schema.json", &json!({ "op": "EXPLODE" }));
}

#[test]
fn command_missing_op_rejected() {
    validate_fails("command.schema.json", &json!({ "point": "Unit1_State" }));
}

#[test]
fn command_extra_field_rejected() {
    validate_fails(
        "command.schema.json",
        &json!({ "op": "PING", "extra": true }),
    );
}
