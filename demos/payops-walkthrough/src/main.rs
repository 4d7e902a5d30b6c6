//! PayOps end-to-end walkthrough.
//!
//! Runs the full decision lifecycle against the in-memory adapter:
//!
//! 1. Ingestion: producer decisions recorded as `pending`
//! 2. Human oversight: approve/reject with compare-and-set, blocked
//!    execution before approval
//! 3. Execution and outcome ingestion: append-only attempt history
//! 4. Insight: correlated decision detail, KPI snapshot, per-action
//!    breakdown
//! 5. Audit trail: classified entries for every transition and every
//!    refused attempt
//! 6. Compliance: deterministic windowed report, byte-identical on
//!    regeneration

use chrono::{Duration, Utc};
use colored::Colorize;
use payops_audit::{modules, AuditTrail};
use payops_compliance::ComplianceReporter;
use payops_insight::{CorrelationEngine, MetricsAggregator};
use payops_lifecycle::LifecycleManager;
use payops_storage::{AuditLogFilter, InMemoryPayopsStore};
use payops_types::{
    AuditLevel, DecisionDraft, ExecutionAppend, ExecutionStatus, OutcomeAppend, Pattern,
};
use std::sync::Arc;

fn header(title: &str) {
    println!();
    println!("{}", "═".repeat(72).cyan());
    println!("  {}", title.cyan().bold());
    println!("{}", "═".repeat(72).cyan());
}

fn separator() {
    println!("{}", "━".repeat(72).dimmed());
}

fn level_tag(level: AuditLevel) -> colored::ColoredString {
    match level {
        AuditLevel::Info => "info".green(),
        AuditLevel::Warn => "warn".yellow(),
        AuditLevel::Error => "error".red(),
        AuditLevel::Critical => "critical".red().bold(),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_target(false)
        .init();

    println!();
    println!(
        "{}",
        "╔══════════════════════════════════════════════════════════════╗".cyan()
    );
    println!(
        "{}",
        "║    PayOps Walkthrough: Lifecycle, Oversight, Compliance      ║"
            .cyan()
            .bold()
    );
    println!(
        "{}",
        "╚══════════════════════════════════════════════════════════════╝".cyan()
    );

    let window_start = Utc::now() - Duration::minutes(1);

    let store = Arc::new(InMemoryPayopsStore::new());
    let manager = LifecycleManager::with_store(store.clone());
    let correlation = CorrelationEngine::new(store.clone());
    let metrics = MetricsAggregator::new(store.clone());
    let reporter = ComplianceReporter::new(store.clone());
    let trail = AuditTrail::new(store.clone());

    // ── Part 1: Recording decisions ─────────────────────────────────
    header("Part 1: Recording Producer Decisions");

    let routing = manager
        .record_decision(
            DecisionDraft::new("pay-dec-001", "adjust_routing")
                .with_confidence(0.92)
                .with_anomaly_score(0.41)
                .with_pattern(Pattern::new("issuer_degradation", "hdfc").with_confidence(0.83))
                .with_hypothesis("issuer latency spike on the HDFC corridor"),
        )
        .await
        .unwrap();
    let retry = manager
        .record_decision(
            DecisionDraft::new("pay-dec-002", "modify_retry_config")
                .with_confidence(0.78)
                .with_anomaly_score(0.12)
                .approval_required(false),
        )
        .await
        .unwrap();
    let limit = manager
        .record_decision(
            DecisionDraft::new("pay-dec-003", "rate_limit")
                .with_confidence(0.55)
                .with_anomaly_score(0.81)
                .with_pattern(Pattern::new("velocity_spike", "card_testing")),
        )
        .await
        .unwrap();

    for (prefix, decision) in [("├", &routing), ("├", &retry), ("└", &limit)] {
        println!(
            "  {} {} [{}] tier={} approval_required={}",
            prefix.dimmed(),
            decision.id.bold(),
            decision.action_type.blue(),
            format!("{}", decision.anomaly_tier()).yellow(),
            decision.approval_required
        );
    }

    // ── Part 2: Human oversight ─────────────────────────────────────
    header("Part 2: Human Oversight with Compare-and-Set");

    let premature = manager.mark_executed("pay-dec-001").await;
    println!(
        "  {} execute before approval: {}",
        "├".dimmed(),
        premature.unwrap_err().to_string().red()
    );

    let approved = manager.approve("pay-dec-001", "riya.iyer").await.unwrap();
    println!(
        "  {} pay-dec-001 approved by {} at {}",
        "├".dimmed(),
        approved.approved_by.as_deref().unwrap_or("?").blue(),
        format!("{}", approved.approved_at.unwrap()).dimmed()
    );

    let rejected = manager.reject("pay-dec-003", "marcus.chen").await.unwrap();
    println!(
        "  {} pay-dec-003 rejected (status={}, approval_given={})",
        "├".dimmed(),
        format!("{}", rejected.status).yellow(),
        rejected.human_approval_given
    );

    let lost_race = manager.approve("pay-dec-003", "riya.iyer").await;
    println!(
        "  {} approve after reject:    {}",
        "├".dimmed(),
        lost_race.unwrap_err().to_string().red()
    );

    let executed = manager.mark_executed("pay-dec-001").await.unwrap();
    let auto = manager.mark_executed("pay-dec-002").await.unwrap();
    println!(
        "  {} executed: {} (approved path), {} (auto path)",
        "└".dimmed(),
        executed.id.green(),
        auto.id.green()
    );

    // ── Part 3: Executions and outcomes ─────────────────────────────
    header("Part 3: Execution and Outcome Ingestion");

    let exec_one = manager
        .record_execution(
            ExecutionAppend::new("pay-dec-001", ExecutionStatus::Success)
                .with_duration_ms(420)
                .with_risk(0.18)
                .with_outcome("traffic shifted to backup acquirer"),
        )
        .await
        .unwrap();
    let exec_two = manager
        .record_execution(
            ExecutionAppend::new("pay-dec-002", ExecutionStatus::Success)
                .with_duration_ms(150)
                .with_risk(0.05)
                .with_outcome("retry backoff widened"),
        )
        .await
        .unwrap();
    let exec_three = manager
        .record_execution(
            ExecutionAppend::new("pay-dec-002", ExecutionStatus::Failed)
                .with_duration_ms(90)
                .with_risk(0.05)
                .with_outcome("config push timed out"),
        )
        .await
        .unwrap();

    for (prefix, execution) in [("├", &exec_one), ("├", &exec_two), ("├", &exec_three)] {
        println!(
            "  {} {} → {} ({} ms, risk {:.2})",
            prefix.dimmed(),
            execution.decision_id,
            format!("{}", execution.status).yellow(),
            execution.duration_ms,
            execution.risk
        );
    }

    manager
        .record_outcome(OutcomeAppend::new(
            "pay-dec-001",
            "auth_rate_recovers",
            "auth_rate_recovers",
            0.95,
        ))
        .await
        .unwrap();
    manager
        .record_outcome(OutcomeAppend::new(
            "pay-dec-002",
            "timeout_rate_drops",
            "timeout_rate_flat",
            0.40,
        ))
        .await
        .unwrap();
    println!("  {} 2 outcomes recorded", "└".dimmed());

    // ── Part 4: Correlation and metrics ─────────────────────────────
    header("Part 4: Correlated Detail and KPI Snapshot");

    let detail = correlation.decision_detail("pay-dec-001").await.unwrap();
    println!(
        "  {} pay-dec-001 detail: {} execution(s), {} outcome(s)",
        "├".dimmed(),
        format!("{}", detail.executions.len()).yellow(),
        format!("{}", detail.outcomes.len()).yellow()
    );

    let snapshot = metrics.compute().await.unwrap();
    println!(
        "  {} decisions={} executed={} approved={} rejected={}",
        "├".dimmed(),
        format!("{}", snapshot.total_decisions).yellow(),
        format!("{}", snapshot.executed).yellow(),
        format!("{}", snapshot.approved).yellow(),
        format!("{}", snapshot.rejected).yellow()
    );
    println!(
        "  {} avg_confidence={:.2} avg_accuracy={:.2} success_rate={:.2}",
        "├".dimmed(),
        snapshot.avg_confidence,
        snapshot.avg_accuracy,
        snapshot.success_rate
    );

    separator();

    let breakdown = metrics.action_type_breakdown().await.unwrap();
    for (i, (action_type, stats)) in breakdown.iter().enumerate() {
        let prefix = if i < breakdown.len() - 1 { "├" } else { "└" };
        println!(
            "  {} {:<20} decisions={} executions={} success_rate={:.2}",
            prefix.dimmed(),
            action_type.blue(),
            stats.decisions,
            stats.executions,
            stats.success_rate
        );
    }

    // ── Part 5: Audit trail ─────────────────────────────────────────
    header("Part 5: Classified Audit Trail (most recent first)");

    let lifecycle_entries = trail
        .recent_for_module(modules::LIFECYCLE, 12)
        .await
        .unwrap();
    for (i, entry) in lifecycle_entries.iter().enumerate() {
        let prefix = if i < lifecycle_entries.len() - 1 {
            "├"
        } else {
            "└"
        };
        println!(
            "  {} [{}] {}",
            prefix.dimmed(),
            level_tag(entry.level),
            entry.message
        );
    }

    // ── Part 6: Compliance report ───────────────────────────────────
    header("Part 6: Deterministic Compliance Report");

    let window_end = Utc::now() + Duration::minutes(1);
    let report = reporter.generate(window_start, window_end).await.unwrap();
    println!(
        "  {} content: {} bytes, digest {}…",
        "├".dimmed(),
        format!("{}", report.content.len()).yellow(),
        report.content_digest[..16].dimmed()
    );

    let regenerated = reporter.generate(window_start, window_end).await.unwrap();
    let identical = report.content == regenerated.content
        && report.content_digest == regenerated.content_digest;
    println!(
        "  {} regenerated byte-identical: {}",
        "├".dimmed(),
        if identical {
            "YES".green().bold()
        } else {
            "NO".red().bold()
        }
    );

    if let Err(err) = reporter.generate(window_end, window_end).await {
        println!(
            "  {} empty window rejected:      {}",
            "└".dimmed(),
            err.to_string().red()
        );
    }

    // ── Summary ─────────────────────────────────────────────────────
    header("Summary");

    let all_entries = trail.recent(AuditLogFilter::new()).await.unwrap();
    println!(
        "  {} decisions recorded:    {}",
        "├".dimmed(),
        format!("{}", snapshot.total_decisions).yellow()
    );
    println!(
        "  {} executions ingested:   {}",
        "├".dimmed(),
        format!("{}", detail.executions.len() + 2).yellow()
    );
    println!(
        "  {} audit entries:         {} (including refused attempts)",
        "├".dimmed(),
        format!("{}", all_entries.len()).yellow()
    );
    println!(
        "  {} oversight invariants:  {}",
        "├".dimmed(),
        "one winner per race, attribution written once".green()
    );
    println!(
        "  {} report determinism:    {}",
        "└".dimmed(),
        if identical {
            "byte-identical regeneration".green()
        } else {
            "mismatch".red()
        }
    );
    println!();
}
