use super::*;
use std::io::Write;

fn write_temp_toml(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn parses_minimal_config() {
    let file = write_temp_toml(
        r#"
        [Source]
        Addr = "127.0.0.1:6380"

        [Destination]
        Addr = "127.0.0.1:6381"
        "#,
    );

    parse(file.path().to_str().unwrap()).await.unwrap();
    let config = get_config();
    assert_eq!(config.source.addr, "127.0.0.1:6380");
    assert_eq!(config.destination.addr, "127.0.0.1:6381");
    assert!(config.password.is_empty());
    assert!(!config.delete_on_get);
}

#[tokio::test]
async fn parses_full_config_with_durations() {
    let file = write_temp_toml(
        r#"
        Password = "hunter2"
        DeleteOnGet = true
        DeleteOnSet = true

        [Source]
        Addr = "source.internal:6379"
        Password = "srcpass"
        MaxIdleConns = 4
        IdleTimeout = "30s"

        [Destination]
        Addr = "dest.internal:6379"
        MaxIdleConns = 16
        IdleTimeout = "5m"
        "#,
    );

    parse(file.path().to_str().unwrap()).await.unwrap();
    let config = get_config();
    assert_eq!(config.password, "hunter2");
    assert!(config.delete_on_get);
    assert!(config.delete_on_set);
    assert_eq!(config.source.password, "srcpass");
    assert_eq!(config.source.max_idle_conns, 4);
    assert_eq!(config.source.idle_timeout.as_secs(), 30);
    assert_eq!(config.destination.idle_timeout.as_secs(), 300);
}

#[tokio::test]
async fn rejects_missing_source_addr() {
    let file = write_temp_toml(
        r#"
        [Source]
        Addr = ""

        [Destination]
        Addr = "127.0.0.1:6381"
        "#,
    );

    let err = parse(file.path().to_str().unwrap()).await.unwrap_err();
    assert!(err.to_string().contains("Source.Addr"));
}

#[tokio::test]
async fn rejects_zero_max_idle_conns() {
    let file = write_temp_toml(
        r#"
        [Source]
        Addr = "127.0.0.1:6380"
        MaxIdleConns = 0

        [Destination]
        Addr = "127.0.0.1:6381"
        "#,
    );

    let err = parse(file.path().to_str().unwrap()).await.unwrap_err();
    assert!(err.to_string().contains("MaxIdleConns"));
}

#[tokio::test]
async fn rejects_missing_file() {
    let err = parse("/no/such/config.toml").await.unwrap_err();
    assert!(err.to_string().contains("could not open"));
}
