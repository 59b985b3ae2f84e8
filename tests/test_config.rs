use std::io::Write;

use keel::config::Config;

#[test]
fn test_config_defaults() {
    let cfg = Config::default();

    assert_eq!(cfg.listen_addr, "127.0.0.1:8080");
    assert_eq!(cfg.workers, 1);
    assert_eq!(cfg.max_body_size, 1024 * 1024);
    assert_eq!(cfg.tick_ms, 10);
    assert_eq!(cfg.server_name, "keel");
    assert_eq!(cfg.log_level, "info");
}

#[test]
fn test_config_partial_yaml_keeps_defaults() {
    let cfg = Config::from_yaml("listen_addr: 0.0.0.0:3000\nworkers: 4\n").unwrap();

    assert_eq!(cfg.listen_addr, "0.0.0.0:3000");
    assert_eq!(cfg.workers, 4);
    assert_eq!(cfg.tick_ms, 10);
    assert_eq!(cfg.server_name, "keel");
}

#[test]
fn test_config_full_yaml() {
    let yaml = r#"
listen_addr: "127.0.0.1:9000"
workers: 2
max_body_size: 4096
tick_ms: 25
server_name: edge
log_level: debug
"#;
    let cfg = Config::from_yaml(yaml).unwrap();

    assert_eq!(
        cfg,
        Config {
            listen_addr: "127.0.0.1:9000".to_string(),
            workers: 2,
            max_body_size: 4096,
            tick_ms: 25,
            server_name: "edge".to_string(),
            log_level: "debug".to_string(),
        }
    );

    let settings = cfg.dispatcher_settings();
    assert_eq!(settings.max_body_size, 4096);
    assert_eq!(settings.server_name, "edge");
}

#[test]
fn test_config_rejects_invalid_values() {
    assert!(Config::from_yaml("workers: 0\n").is_err());
    assert!(Config::from_yaml("tick_ms: 0\n").is_err());
    assert!(Config::from_yaml("server_name: \"\"\n").is_err());
    assert!(Config::from_yaml("server_name: \"a\\r\\nX-Injected: 1\"\n").is_err());
    assert!(Config::from_yaml("workers: many\n").is_err());
}

#[test]
fn test_config_from_file() {
    let path = std::env::temp_dir().join(format!("keel-config-{}.yaml", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "server_name: from-file").unwrap();
    drop(file);

    let cfg = Config::from_file(&path).unwrap();
    assert_eq!(cfg.server_name, "from-file");

    std::fs::remove_file(&path).unwrap();
    assert!(Config::from_file(&path).is_err());
}

// Environment variables are process-wide, so every env-dependent case lives
// in this one test.
#[test]
fn test_config_load_from_env() {
    unsafe {
        std::env::remove_var("KEEL_CONFIG");
        std::env::remove_var("LISTEN");
    }
    assert_eq!(Config::load().unwrap(), Config::default());

    unsafe {
        std::env::set_var("LISTEN", "0.0.0.0:5000");
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.listen_addr, "0.0.0.0:5000");
    assert_eq!(cfg.workers, 1);

    let path = std::env::temp_dir().join(format!("keel-env-{}.yaml", std::process::id()));
    std::fs::write(&path, "listen_addr: 127.0.0.1:7000\nworkers: 3\n").unwrap();
    unsafe {
        std::env::set_var("KEEL_CONFIG", &path);
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.listen_addr, "0.0.0.0:5000");
    assert_eq!(cfg.workers, 3);

    unsafe {
        std::env::set_var("KEEL_CONFIG", "/nonexistent/keel.yaml");
    }
    assert!(Config::load().is_err());

    unsafe {
        std::env::remove_var("KEEL_CONFIG");
        std::env::remove_var("LISTEN");
    }
    std::fs::remove_file(&path).unwrap();
}
