use chrono::{Duration, Utc};
use dcron_core::models::Job;
use dcron_dispatcher::{CronScheduler, SchedulePlan};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now();

    println!("=== CRON调度器演示 ===\n");
    println!("1. 解析CRON表达式:");
    for (label, expr) in [
        ("每5秒执行", "*/5 * * * * *"),
        ("每分钟执行", "0 * * * * *"),
        ("每天9点执行(5段)", "0 9 * * *"),
        ("工作日9点执行", "0 0 9 * * Mon-Fri"),
    ] {
        let scheduler = CronScheduler::new(expr)?;
        println!(
            "   {label}: {} ({})",
            scheduler.get_frequency_description(now),
            scheduler.expression()
        );
    }

    println!();
    println!("2. 下一次触发时间:");
    let every_five = CronScheduler::new("*/5 * * * * *")?;
    println!("   当前时间: {}", now.format("%Y-%m-%d %H:%M:%S UTC"));
    for time in every_five.upcoming_times(now, 3) {
        println!("   -> {}", time.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(wait) = every_five.time_until_next_execution(now) {
        println!("   距离下一次: {}毫秒", wait.num_milliseconds());
    }

    println!();
    println!("3. 调度计划推进(错过的触发点不补跑):");
    let mut plan = SchedulePlan::build(Job::new("ping", "echo hi", "*/5 * * * * *"), now)?;
    println!("   首次触发: {}", plan.next_fire_time.format("%H:%M:%S"));
    let late = plan.next_fire_time + Duration::seconds(12);
    println!("   在 {} 才检查, 是否到期: {}", late.format("%H:%M:%S"), plan.is_due(late));
    plan.advance(late);
    println!("   推进后的触发: {}", plan.next_fire_time.format("%H:%M:%S"));

    println!();
    println!("4. 非法表达式:");
    for expr in ["not a cron", "61 * * * * *"] {
        match CronScheduler::validate_cron_expression(expr) {
            Ok(()) => println!("   {expr}: 有效"),
            Err(e) => println!("   {expr}: {e}"),
        }
    }

    Ok(())
}
