use qitd_log::{capture_snapshot, clear_captured, enable_capture, init, Format, Level, LogConfig};

#[test]
fn capture_keeps_most_recent_records() {
    init(LogConfig {
        level: Level::Debug,
        format: Format::Text,
        timestamps: false,
    });
    qitd_log::set_stderr_enabled(false);
    enable_capture(2);
    clear_captured();

    qitd_log::log_info!("first");
    qitd_log::log_debug!("second {}", 2);
    qitd_log::log_warn!("third");
    qitd_log::log_trace!("filtered out");

    let records = capture_snapshot(10);
    let messages: Vec<&str> = records.iter().map(|record| record.msg.as_str()).collect();
    assert_eq!(messages, vec!["second 2", "third"]);
    assert_eq!(records[1].level, Level::Warn);
    assert_eq!(records[1].target, "capture");

    assert_eq!(capture_snapshot(1).len(), 1);
    enable_capture(0);
    assert!(capture_snapshot(10).is_empty());
}
