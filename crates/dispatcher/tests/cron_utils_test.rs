use dcron_dispatcher::cron_utils::*;

use chrono::{Duration, TimeZone, Timelike, Utc};

#[test]
fn test_cron_scheduler_creation() {
    assert!(CronScheduler::new("* * * * * *").is_ok());
    assert!(CronScheduler::new("0 0 0 * * *").is_ok());
    assert!(CronScheduler::new("invalid").is_err());
}

#[test]
fn test_five_field_expression() {
    let scheduler = CronScheduler::new("*/5 * * * *").unwrap();
    assert_eq!(scheduler.expression(), "*/5 * * * *");

    let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 2, 30).unwrap();
    let next = scheduler.next_after(now).unwrap();
    assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 12, 5, 0).unwrap());
}

#[test]
fn test_next_after_is_strictly_later() {
    let expressions = [
        "* * * * * *",
        "0 * * * * *",
        "*/5 * * * *",
        "0 0 0 * * *",
        "0 30 9 * * 1-5",
    ];
    let instants = [
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap(),
        Utc.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap() + Duration::milliseconds(250),
    ];

    for expr in expressions {
        let scheduler = CronScheduler::new(expr).unwrap();
        for now in instants {
            let next = scheduler.next_after(now).unwrap();
            assert!(next > now, "{expr}: {next} 不晚于 {now}");
        }
    }
}

#[test]
fn test_next_after_on_exact_fire_time() {
    let scheduler = CronScheduler::new("0 * * * * *").unwrap();
    let on_the_minute = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    let next = scheduler.next_after(on_the_minute).unwrap();
    assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 12, 1, 0).unwrap());
}

#[test]
fn test_validate_cron_expression() {
    assert!(CronScheduler::validate_cron_expression("0 0 0 * * *").is_ok());
    assert!(CronScheduler::validate_cron_expression("0 */5 * * * *").is_ok());
    assert!(CronScheduler::validate_cron_expression("0 0 9-17 * * 1-5").is_ok());
    assert!(CronScheduler::validate_cron_expression("invalid").is_err());
    assert!(CronScheduler::validate_cron_expression("0 0 0 32 * *").is_err());
    assert!(CronScheduler::validate_cron_expression("").is_err());
}

#[test]
fn test_upcoming_times() {
    let scheduler = CronScheduler::new("0 0 * * * *").unwrap();

    let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap();
    let upcoming = scheduler.upcoming_times(now, 3);

    assert_eq!(upcoming.len(), 3);
    assert_eq!(upcoming[0].hour(), 13);
    assert_eq!(upcoming[1].hour(), 14);
    assert_eq!(upcoming[2].hour(), 15);
}

#[test]
fn test_time_until_and_frequency() {
    let scheduler = CronScheduler::new("0 */5 * * * *").unwrap();
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 1, 0).unwrap();

    assert_eq!(
        scheduler.time_until_next_execution(now),
        Some(Duration::minutes(4))
    );
    assert_eq!(scheduler.get_frequency_description(now), "每5分钟");
}
