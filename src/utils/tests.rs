use super::error::ClientError;
use super::logging;

#[test]
fn logging_init_accepts_levels() {
    // Should not panic
    logging::init("info");
    logging::init("debug");
    logging::init("warn");
}

#[test]
fn unknown_levels_fall_back_to_info() {
    assert_eq!(logging::normalize_level("WARNING"), "warn");
    assert_eq!(logging::normalize_level("Trace"), "trace");
    assert_eq!(logging::normalize_level("verbose"), "info");
}

#[test]
fn error_display_messages() {
    assert_eq!(ClientError::NotConnected.to_string(), "Not connected");
    assert_eq!(
        ClientError::Publish("topic closed".into()).to_string(),
        "Delivery error: topic closed"
    );
    assert_eq!(
        ClientError::VerifyFailure {
            key: "samplekey".into()
        }
        .to_string(),
        "Signature verification failed for message key samplekey"
    );
}

#[test]
fn serde_errors_convert() {
    let json_err = serde_json::from_str::<String>("not valid json").unwrap_err();
    let err: ClientError = json_err.into();
    assert!(matches!(err, ClientError::Serialization(_)));
}
