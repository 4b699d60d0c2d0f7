//! Global subscriber installation. Kept in its own test binary so nothing
//! else has installed a subscriber first.

use lstore_common::config::{Config, LoggingConfig};
use lstore_common::logging;
use lstore_common::Error;

#[test]
fn test_init_installs_json_subscriber_once() {
    let config = Config::from_toml_str("[logging]\nlevel = \"lstore=debug\"\njson = true\n")
        .expect("Failed to parse config");
    assert!(config.logging.json);

    logging::init(&config.logging).expect("Failed to install subscriber");
    emit_engine_events();

    let again = LoggingConfig::default();
    assert!(matches!(logging::init(&again), Err(Error::Internal(_))));
}

fn emit_engine_events() {
    let db = lstore_storage::Database::default();
    let table = db.create_table("logged", 2, 0).expect("Failed to create table");
    table.insert(&[1, 2]).expect("insert failed");
    assert_eq!(table.get(1).unwrap().get(1), Some(2));
}
