use afd_webui::errors::status;
use afd_webui::AppError;

#[test]
fn display_prefixes_the_variant() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::HostConfig("bad".into()), "host config: bad"),
        (AppError::Session("bad".into()), "session: bad"),
        (AppError::Exec("bad".into()), "exec: bad"),
        (AppError::PayloadTooLarge("bad".into()), "payload too large: bad"),
        (AppError::NotFound("bad".into()), "not found: bad"),
        (AppError::PathViolation("bad".into()), "path violation: bad"),
        (AppError::Io("bad".into()), "io: bad"),
        (AppError::Protocol("bad".into()), "protocol: bad"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn reply_status_per_variant() {
    assert_eq!(AppError::HostConfig(String::new()).status(), status::NOT_SATISFIABLE);
    assert_eq!(AppError::NotFound(String::new()).status(), status::NOT_FOUND);
    assert_eq!(
        AppError::PayloadTooLarge(String::new()).status(),
        status::PAYLOAD_TOO_LARGE
    );
    assert_eq!(AppError::Protocol(String::new()).status(), status::NOT_ACCEPTABLE);
    assert_eq!(AppError::Exec(String::new()).status(), status::ERROR);
    assert_eq!(AppError::PathViolation(String::new()).status(), status::ERROR);
}

#[test]
fn io_not_found_maps_to_not_found() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(matches!(err, AppError::NotFound(_)));

    let err: AppError = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no").into();
    assert!(matches!(err, AppError::Io(_)));
}

#[test]
fn json_and_regex_errors_are_protocol_errors() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
    assert!(matches!(AppError::from(json_err), AppError::Protocol(_)));

    let regex_err = regex::Regex::new("(").expect_err("invalid regex");
    assert!(matches!(AppError::from(regex_err), AppError::Protocol(_)));
}
