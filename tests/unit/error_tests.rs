use agent_helm::AppError;

#[test]
fn capacity_error_names_the_limit() {
    let err = AppError::CapacityExceeded { limit: 4 };
    assert_eq!(err.to_string(), "concurrent session limit reached (4)");
}

#[test]
fn spawn_error_display_starts_with_spawn_prefix() {
    let err = AppError::Spawn("claude: command not found".into());
    assert!(err.to_string().starts_with("spawn:"));
    assert!(err.to_string().contains("command not found"));
}

#[test]
fn error_messages_have_no_trailing_period() {
    let errors = [
        AppError::Config("bad value".into()),
        AppError::Db("locked".into()),
        AppError::CapacityExceeded { limit: 1 },
        AppError::Spawn("failed".into()),
        AppError::NotFound("session x".into()),
        AppError::Io("denied".into()),
    ];
    for err in errors {
        let s = err.to_string();
        assert!(
            !s.ends_with('.'),
            "error message must not end with a period: {s}"
        );
    }
}

#[test]
fn variants_are_distinct_in_display() {
    let db = AppError::Db("boom".into());
    let io = AppError::Io("boom".into());
    assert_ne!(db.to_string(), io.to_string());
    assert!(db.to_string().starts_with("db:"));
    assert!(io.to_string().starts_with("io:"));
}

#[test]
fn sqlx_errors_convert_to_db_variant() {
    let err = AppError::from(sqlx::Error::RowNotFound);
    match err {
        AppError::Db(_) => {}
        other => panic!("expected Db variant, got {other:?}"),
    }
}

#[test]
fn io_errors_convert_to_io_variant() {
    let source = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err = AppError::from(source);
    match err {
        AppError::Io(msg) => assert!(msg.contains("denied")),
        other => panic!("expected Io variant, got {other:?}"),
    }
}

#[test]
fn implements_std_error_trait() {
    let err: Box<dyn std::error::Error> = Box::new(AppError::NotFound("gone".into()));
    assert!(!err.to_string().is_empty());
}
