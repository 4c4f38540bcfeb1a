use serial_test::serial;

use super::error::{BrokerError, ClientError, TransportError};
use super::logging;
use crate::protocol::CommandCode;

#[test]
#[serial]
fn logging_filter_uses_configured_level() {
    temp_env::with_var_unset("RUST_LOG", || {
        assert_eq!(logging::filter("warning").to_string(), "warn");
        assert_eq!(logging::filter("DEBUG").to_string(), "debug");
        assert_eq!(logging::filter("nonsense").to_string(), "info");
    });
}

#[test]
#[serial]
fn logging_filter_prefers_rust_log() {
    temp_env::with_var("RUST_LOG", Some("trace"), || {
        assert_eq!(logging::filter("error").to_string(), "trace");
    });
}

#[test]
#[serial]
fn logging_init_accepts_levels() {
    // Should not panic
    logging::init("info");
    logging::init("debug");
    logging::init("warn");
    logging::init("nonsense");
}

#[test]
fn test_malformed_transport_errors() {
    assert!(
        TransportError::NotMessage {
            expected: 10,
            received: 3
        }
        .is_malformed()
    );
    assert!(TransportError::FrameTooLarge { len: 10, max: 1 }.is_malformed());
    assert!(!TransportError::NoData.is_malformed());
}

#[test]
fn test_error_messages() {
    let err = ClientError::Rejected {
        code: CommandCode::Port,
        reason: "client port pool exhausted".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "broker rejected PORT: client port pool exhausted"
    );
    assert_eq!(
        BrokerError::PoolExhausted.to_string(),
        "client port pool exhausted"
    );
}
