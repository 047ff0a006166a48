//! End-to-end client flows against a mock server speaking the envelope
//! protocol: white-box outer codec, AES-encrypted respondData, signed
//! requests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use dicloud_core::{CommandCode, CoreClient, CoreConfig, CoreError, Section};
use dicloud_crypto::digest::md5_hex_upper;
use dicloud_crypto::{aes, WhiteBoxCodec};

const PASSWORD: &str = "p";
const PIN: &str = "123456";

fn content_key() -> String {
    // Session tokens in these tests are always ("S", "E").
    md5_hex_upper("E")
}

fn login_key() -> String {
    md5_hex_upper(PASSWORD)
}

/// Encode an outer response object the way the real service does.
fn wire(outer: Value) -> String {
    let codec = WhiteBoxCodec::new().unwrap();
    let encoded = codec.encode_envelope(outer.to_string().as_bytes());
    json!({ "response": encoded }).to_string()
}

/// `code=0` response with an encrypted payload.
fn wire_ok(payload: &Value, key: &str) -> String {
    let encrypted = aes::encrypt_hex(&payload.to_string(), key).unwrap();
    wire(json!({"code": "0", "message": "success", "respondData": encrypted}))
}

/// Non-zero code response without payload.
fn wire_code(code: &str, message: &str) -> String {
    wire(json!({"code": code, "message": message, "respondData": ""}))
}

fn login_body() -> String {
    wire_ok(
        &json!({"token": {"userId": "1434", "signToken": "S", "encryToken": "E"}}),
        &login_key(),
    )
}

/// Replays a fixed sequence of bodies, then keeps returning the last one.
struct BodySequence {
    bodies: Mutex<VecDeque<String>>,
    last: String,
}

impl BodySequence {
    fn new(bodies: Vec<String>) -> Self {
        let last = bodies.last().cloned().expect("at least one body");
        Self {
            bodies: Mutex::new(bodies.into()),
            last,
        }
    }
}

impl Respond for BodySequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let mut bodies = self.bodies.lock().unwrap();
        let body = match bodies.len() {
            0 | 1 => bodies.front().cloned().unwrap_or_else(|| self.last.clone()),
            _ => bodies.pop_front().unwrap(),
        };
        ResponseTemplate::new(200).set_body_string(body)
    }
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/app/account/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(login_body()))
        .mount(server)
        .await;
}

fn test_config(server: &MockServer) -> CoreConfig {
    CoreConfig::new("u@x", PASSWORD)
        .with_base_url(server.uri())
        .with_control_pin(PIN)
        .with_mqtt_enabled(false)
        .with_polling(3, Duration::from_millis(20))
        .with_mqtt_timeout(Duration::from_millis(50))
}

/// Decode a captured request body back into the outer field map.
fn decode_request(body: &[u8]) -> Value {
    let codec = WhiteBoxCodec::new().unwrap();
    let wrapper: Value = serde_json::from_slice(body).unwrap();
    let outer = codec
        .decode_envelope(wrapper["request"].as_str().unwrap())
        .unwrap();
    serde_json::from_slice(&outer).unwrap()
}

#[tokio::test]
async fn login_round_trip_derives_session_keys() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let client = CoreClient::new(test_config(&server)).unwrap();
    client.login().await.unwrap();

    let session = client.ensure_session().await.unwrap();
    assert_eq!(session.user_id, "1434");
    assert_eq!(session.sign_key, md5_hex_upper("S"));
    assert_eq!(session.content_key, md5_hex_upper("E"));

    // The request on the wire is a white-box envelope with a signed outer.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let outer = decode_request(&requests[0].body);
    assert_eq!(outer["functionType"], "pwdLogin");
    assert_eq!(outer["identifier"], "u@x");
    assert_eq!(outer["sign"].as_str().unwrap().len(), 40);
    assert!(!outer["encryData"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn realtime_trigger_then_poll_until_fresh() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let key = content_key();
    Mock::given(method("POST"))
        .and(path("/vehicleInfo/vehicle/vehicleRealTimeRequest"))
        .respond_with(ResponseTemplate::new(200).set_body_string(wire_ok(
            &json!({"onlineState": 0, "requestSerial": "ABC"}),
            &key,
        )))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/vehicleInfo/vehicle/vehicleRealTimeResult"))
        .respond_with(BodySequence::new(vec![
            wire_ok(&json!({"onlineState": 0, "requestSerial": "ABC"}), &key),
            wire_ok(
                &json!({
                    "onlineState": 1,
                    "elecPercent": 70,
                    "tempInCar": -129,
                    "time": 1_770_817_900u64,
                    "requestSerial": "ABC"
                }),
                &key,
            ),
        ]))
        .mount(&server)
        .await;

    let client = CoreClient::new(test_config(&server)).unwrap();
    client.login().await.unwrap();
    let status = client.realtime("VIN1").await.unwrap();

    assert_eq!(status.elec_percent, Some(70.0));
    assert_eq!(status.temp_in_car, None);
    assert!(status.is_ready());

    let section = client.section("VIN1", Section::Realtime);
    assert_eq!(section.get("elecPercent"), Some(&json!(70.0)));
    assert_eq!(section.get("tempInCar"), None);
    assert_eq!(section.updated_at_ms, Some(1_770_817_900_000));

    // Poll requests carried the serial from the trigger.
    let polls: Vec<_> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().ends_with("vehicleRealTimeResult"))
        .map(|r| decode_request(&r.body))
        .collect();
    assert_eq!(polls.len(), 2);
}

#[tokio::test]
async fn stale_realtime_poll_exhausts_and_keeps_store_untouched() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let key = content_key();
    let pending = wire_ok(&json!({"onlineState": 0, "requestSerial": "ABC"}), &key);
    for endpoint in [
        "/vehicleInfo/vehicle/vehicleRealTimeRequest",
        "/vehicleInfo/vehicle/vehicleRealTimeResult",
    ] {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_body_string(pending.clone()))
            .mount(&server)
            .await;
    }

    let client = CoreClient::new(test_config(&server)).unwrap();
    client.login().await.unwrap();
    let status = client.realtime("VIN1").await.unwrap();

    assert!(!status.is_ready());
    assert_eq!(status.request_serial.as_deref(), Some("ABC"));
    assert!(client.section("VIN1", Section::Realtime).fields.is_empty());
}

#[tokio::test]
async fn session_expiry_reauths_once_and_retries() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let key = content_key();
    Mock::given(method("POST"))
        .and(path("/vehicleInfo/vehicle/vehicleRealTimeRequest"))
        .respond_with(BodySequence::new(vec![
            wire_code("1002", "session expired"),
            wire_ok(
                &json!({"onlineState": 1, "elecPercent": 55, "time": 1_770_817_900u64}),
                &key,
            ),
        ]))
        .mount(&server)
        .await;

    let client = CoreClient::new(test_config(&server)).unwrap();
    client.login().await.unwrap();
    let status = client.realtime("VIN1").await.unwrap();
    assert_eq!(status.elec_percent, Some(55.0));

    // Two logins total: the explicit one and the re-auth.
    let logins = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().ends_with("/app/account/login"))
        .count();
    assert_eq!(logins, 2);

    let section = client.section("VIN1", Section::Realtime);
    assert_eq!(section.get("elecPercent"), Some(&json!(55.0)));
}

#[tokio::test]
async fn vehicle_list_records_permissions() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/app/account/getAllListByUserId"))
        .respond_with(ResponseTemplate::new(200).set_body_string(wire_ok(
            &json!([
                {"vin": "VIN1", "modelName": "SEAL", "defaultCar": 1},
                {"vin": "VIN2", "modelName": "DOLPHIN",
                 "rangeDetailList": [{"code": "10", "name": "Basic control"}]}
            ]),
            &content_key(),
        )))
        .mount(&server)
        .await;

    let client = CoreClient::new(test_config(&server)).unwrap();
    client.login().await.unwrap();
    let vehicles = client.vehicles().await.unwrap();
    assert_eq!(vehicles.len(), 2);
    assert!(vehicles[0].default_car);
    assert_eq!(vehicles[1].permissions.len(), 1);

    // Battery heating is rejected locally under a Basic-control-only grant.
    let err = client
        .execute("VIN2", CommandCode::BatteryHeat, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::EndpointNotSupported { .. }));
}

#[tokio::test]
async fn command_immediate_success_applies_overlay() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/control/remoteControl"))
        .respond_with(ResponseTemplate::new(200).set_body_string(wire_ok(
            &json!({"controlState": 1, "requestSerial": "X1"}),
            &content_key(),
        )))
        .mount(&server)
        .await;

    let client = CoreClient::new(test_config(&server)).unwrap();
    client.login().await.unwrap();
    let result = client.execute("VIN1", CommandCode::Lock, None).await.unwrap();
    assert_eq!(result.request_serial.as_deref(), Some("X1"));

    let section = client.section("VIN1", Section::Realtime);
    for lock in [
        "leftFrontDoorLock",
        "rightFrontDoorLock",
        "leftRearDoorLock",
        "rightRearDoorLock",
    ] {
        assert_eq!(section.get(lock), Some(&json!(2)), "{lock}");
    }

    // The trigger carried the hashed PIN and the wire command type.
    let trigger = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.url.path().ends_with("remoteControl"))
        .unwrap();
    let outer = decode_request(&trigger.body);
    let inner =
        aes::decrypt_utf8(outer["encryData"].as_str().unwrap(), &content_key()).unwrap();
    let inner: Value = serde_json::from_str(&inner).unwrap();
    assert_eq!(inner["commandType"], "LOCKDOOR");
    assert_eq!(inner["commandPwd"], md5_hex_upper(PIN).as_str());
}

#[tokio::test]
async fn command_poll_fallback_resolves_success() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let key = content_key();
    Mock::given(method("POST"))
        .and(path("/control/remoteControl"))
        .respond_with(ResponseTemplate::new(200).set_body_string(wire_ok(
            &json!({"controlState": 0, "requestSerial": "X1"}),
            &key,
        )))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/control/remoteControlResult"))
        .respond_with(BodySequence::new(vec![
            wire_ok(&json!({"controlState": 0, "requestSerial": "X1"}), &key),
            wire_ok(&json!({"controlState": 1, "requestSerial": "X1"}), &key),
        ]))
        .mount(&server)
        .await;

    let client = CoreClient::new(test_config(&server)).unwrap();
    client.login().await.unwrap();
    let result = client.execute("VIN1", CommandCode::Unlock, None).await.unwrap();
    assert_eq!(result.request_serial.as_deref(), Some("X1"));

    let section = client.section("VIN1", Section::Realtime);
    assert_eq!(section.get("leftFrontDoorLock"), Some(&json!(1)));

    let attempts = client.recent_attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].request_serial, "X1");
    assert_eq!(attempts[0].outcome, dicloud_core::AttemptOutcome::Success);
}

#[tokio::test]
async fn command_failure_surfaces_without_overlay() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/control/remoteControl"))
        .respond_with(ResponseTemplate::new(200).set_body_string(wire_ok(
            &json!({"controlState": 2, "requestSerial": "X1"}),
            &content_key(),
        )))
        .mount(&server)
        .await;

    let client = CoreClient::new(test_config(&server)).unwrap();
    client.login().await.unwrap();
    let err = client.execute("VIN1", CommandCode::Lock, None).await.unwrap_err();
    assert!(matches!(err, CoreError::RemoteControlFailure));
    assert!(client.section("VIN1", Section::Realtime).fields.is_empty());
}

#[tokio::test]
async fn command_times_out_when_polls_stay_pending() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let key = content_key();
    Mock::given(method("POST"))
        .and(path("/control/remoteControl"))
        .respond_with(ResponseTemplate::new(200).set_body_string(wire_ok(
            &json!({"controlState": 0, "requestSerial": "X1"}),
            &key,
        )))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/control/remoteControlResult"))
        .respond_with(ResponseTemplate::new(200).set_body_string(wire_ok(
            &json!({"controlState": 0, "requestSerial": "X1"}),
            &key,
        )))
        .mount(&server)
        .await;

    let client = CoreClient::new(test_config(&server)).unwrap();
    client.login().await.unwrap();
    let err = client.execute("VIN1", CommandCode::Lock, None).await.unwrap_err();
    assert!(matches!(err, CoreError::Timeout { .. }));

    let attempts = client.recent_attempts();
    assert_eq!(attempts[0].outcome, dicloud_core::AttemptOutcome::Timeout);
}

#[tokio::test]
async fn wrong_pin_locks_out_further_commands_locally() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/control/remoteControl"))
        .respond_with(ResponseTemplate::new(200)
            .set_body_string(wire_code("5005", "control password wrong")))
        .mount(&server)
        .await;

    let client = CoreClient::new(test_config(&server)).unwrap();
    client.login().await.unwrap();

    let first = client.execute("VIN1", CommandCode::Lock, None).await.unwrap_err();
    assert!(matches!(first, CoreError::ControlPasswordWrong));
    assert!(client.is_control_locked());

    let second = client.execute("VIN1", CommandCode::Unlock, None).await.unwrap_err();
    assert!(matches!(second, CoreError::ControlPasswordLocked));

    // The second command never touched the network.
    let triggers = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().ends_with("remoteControl"))
        .count();
    assert_eq!(triggers, 1);
}

#[tokio::test]
async fn rate_limited_trigger_retries_then_succeeds() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let key = content_key();
    Mock::given(method("POST"))
        .and(path("/control/remoteControl"))
        .respond_with(BodySequence::new(vec![
            wire_code("6024", "busy"),
            wire_ok(&json!({"controlState": 1, "requestSerial": "X2"}), &key),
        ]))
        .mount(&server)
        .await;

    let client = CoreClient::new(test_config(&server)).unwrap();
    client.login().await.unwrap();
    let result = client.execute("VIN1", CommandCode::FlashLights, None).await.unwrap();
    assert_eq!(result.request_serial.as_deref(), Some("X2"));

    let triggers = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().ends_with("remoteControl"))
        .count();
    assert_eq!(triggers, 2);
}

#[tokio::test]
async fn charging_status_merges_into_store() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/control/smartCharge/homePage"))
        .respond_with(ResponseTemplate::new(200).set_body_string(wire_ok(
            &json!({
                "soc": 66,
                "chargingState": 15,
                "connectState": 1,
                "fullHour": -1,
                "fullMinute": -1,
                "updateTime": 1_770_817_000u64
            }),
            &content_key(),
        )))
        .mount(&server)
        .await;

    let client = CoreClient::new(test_config(&server)).unwrap();
    client.login().await.unwrap();
    let status = client.charging_status("VIN1").await.unwrap();
    assert_eq!(status.soc, Some(66));
    assert!(status.is_connected());
    assert!(!status.is_charging());

    let section = client.section("VIN1", Section::Charging);
    assert_eq!(section.get("soc"), Some(&json!(66)));
    assert_eq!(section.get("fullHour"), None);
}

#[tokio::test]
async fn back_to_back_lock_commands_converge() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("POST"))
        .and(path("/control/remoteControl"))
        .respond_with(ResponseTemplate::new(200).set_body_string(wire_ok(
            &json!({"controlState": 1, "requestSerial": "X3"}),
            &content_key(),
        )))
        .mount(&server)
        .await;

    let client = CoreClient::new(test_config(&server)).unwrap();
    client.login().await.unwrap();
    client.execute("VIN1", CommandCode::Lock, None).await.unwrap();
    client.execute("VIN1", CommandCode::Lock, None).await.unwrap();

    let section = client.section("VIN1", Section::Realtime);
    assert_eq!(section.get("leftFrontDoorLock"), Some(&json!(2)));
}
