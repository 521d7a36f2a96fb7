use std::time::Duration;

use super::common::*;
use aerospike_operator::error::Error;

#[test]
fn api_status_codes_are_classified() {
    let missing = api_error(404, "NotFound", "pods \"c-2\" not found");
    assert!(missing.is_not_found());
    assert!(!missing.is_already_exists());

    let exists = api_error(409, "AlreadyExists", "pods \"c-1\" already exists");
    assert!(exists.is_already_exists());
    assert!(!exists.is_not_found());

    // A write conflict shares the code but is not a create race.
    let conflict = api_error(409, "Conflict", "the object has been modified");
    assert!(!conflict.is_already_exists());

    let invalid = api_error(422, "Invalid", "spec.containers: Required value");
    assert!(!invalid.is_not_found());
    assert!(!invalid.is_already_exists());
    assert!(!invalid.is_validation(), "API rejections are not user resource errors");
}

#[test]
fn only_api_errors_carry_a_status() {
    let err = Error::InfoProtocol("connection reset".to_string());
    assert!(!err.is_not_found());
    assert!(!err.is_already_exists());

    let timeout = Error::MigrationTimeout {
        address: "10.0.0.2:3000".to_string(),
        timeout: Duration::from_secs(5),
    };
    assert!(!timeout.is_not_found());
}

#[test]
fn user_resource_errors_are_validation_errors() {
    assert!(Error::ClusterNotFound("as".to_string()).is_validation());
    assert!(Error::SecretNotFound("gcs-creds".to_string()).is_validation());
    assert!(Error::NamespaceNotExists {
        cluster: "as".to_string(),
        namespace: "data".to_string(),
    }
    .is_validation());
    assert!(Error::InvalidSecretFileName {
        secret: "gcs-creds".to_string(),
        file: "key.json".to_string(),
    }
    .is_validation());

    assert!(!Error::config("bad flag").is_validation());
    assert!(!Error::InfoProtocol("eof".to_string()).is_validation());
}
