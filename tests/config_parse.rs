use docshift::config::Config;

#[test]
fn parse_example_config() {
    let raw = include_str!("../docshift.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert_eq!(cfg.race.poll_interval_ms, 50);
    assert!(cfg.ocr.batch_pages >= 1);
    assert!(!cfg.security.passphrase_env.is_empty());
}

#[test]
fn env_overrides_take_precedence() {
    // Set all three in one test; env vars are process-wide.
    unsafe {
        std::env::set_var("DOCSHIFT_TIMEOUT_SECONDS", "7");
        std::env::set_var("DOCSHIFT_OCR_BATCH_PAGES", "3");
        std::env::set_var("DOCSHIFT_OCR_WORKERS", "2");
    }
    let mut cfg = Config::default();
    cfg.apply_env_overrides();
    assert_eq!(cfg.race.timeout_seconds, 7);
    assert_eq!(cfg.ocr.batch_pages, 3);
    assert_eq!(cfg.ocr.max_workers, 2);
    unsafe {
        std::env::remove_var("DOCSHIFT_TIMEOUT_SECONDS");
        std::env::remove_var("DOCSHIFT_OCR_BATCH_PAGES");
        std::env::remove_var("DOCSHIFT_OCR_WORKERS");
    }
}
