use solarouter::error::RouterError;

#[test]
fn error_constructors() {
    assert!(matches!(RouterError::config("x"), RouterError::Config { .. }));
    assert!(matches!(RouterError::bus("x"), RouterError::Bus { .. }));
    assert!(matches!(
        RouterError::discovery("x"),
        RouterError::Discovery { .. }
    ));
    assert!(matches!(RouterError::io("x"), RouterError::Io { .. }));
    assert!(matches!(
        RouterError::validation("f", "m"),
        RouterError::Validation { .. }
    ));
}

#[test]
fn conversions() {
    let io: RouterError = std::io::Error::other("boom").into();
    assert!(matches!(io, RouterError::Io { .. }));

    let json: RouterError = serde_json::from_str::<u8>("nope").unwrap_err().into();
    assert!(matches!(json, RouterError::Serialization { .. }));
}
