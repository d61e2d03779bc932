//! Reconcile a small bank statement against receipts and rules

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use reconciliation_core::utils::MemoryRuleSource;
use reconciliation_core::{
    rules, ReceiptId, ReceiptRecord, ReconciliationConfig, Reconciler, RuleDocument,
    StatementEntry,
};

const RULES: &str = r#"
[[rules]]
id = "bank_fee_doc_ted"
name = "Tarifa DOC/TED"
priority = 10

[[rules.conditions]]
field = "description"
operator = "regex"
value = 'TARIFA\s+(DOC|TED)'

[[rules.conditions]]
field = "amount"
operator = "between"
value = ["0.01", "100.00"]

[rules.action]
kind = "auto_approve"
confidence = 0.95
note = "Bank transfer fee"
category = "bank_fees"

[[rules]]
id = "iof"
name = "IOF"
priority = 20

[[rules.conditions]]
field = "description"
operator = "contains"
value = ["IOF", "IMPOSTO"]

[[rules.conditions]]
field = "kind"
operator = "in"
value = ["DEBIT"]

[rules.action]
kind = "auto_approve"
confidence = 0.90
category = "taxes"
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("🏦 Reconciliation Core - Statement Example\n");

    // 1. Load the rule set through a rule source
    let source = MemoryRuleSource::new();
    source.insert("default", RuleDocument::toml(RULES))?;
    let rule_set = rules::load_from_source(&source, "default").await?;

    let summary = rule_set.summary();
    println!(
        "📜 Loaded {} active rule(s), {} inactive",
        summary.active, summary.inactive
    );
    for (id, priority) in &summary.order {
        println!("  ✓ {} (priority {})", id, priority);
    }
    println!();

    // 2. Statement entries and receipts
    let day = |d: u32| NaiveDate::from_ymd_opt(2025, 11, d).ok_or("invalid date");
    let amount = |s: &str| BigDecimal::from_str(s);

    let entries = vec![
        StatementEntry::debit(1, day(2)?, amount("15.00")?, "TARIFA DOC/TED REF 123")?,
        StatementEntry::debit(2, day(2)?, amount("150.50")?, "PIX MERCADO CENTRAL")?,
        StatementEntry::debit(3, day(3)?, amount("3.27")?, "IOF COMPRA INTERNACIONAL")?,
        StatementEntry::debit(4, day(4)?, amount("50.00")?, "PAGAMENTO BOLETO")?,
        StatementEntry::debit(5, day(2)?, amount("999.99")?, "COMPRA DESCONHECIDA")?,
    ];
    let receipts = vec![
        ReceiptRecord::new(
            ReceiptId(1),
            amount("150.50")?,
            day(2)?,
            Some("Mercado Central".to_string()),
            0.93,
        )?,
        ReceiptRecord::simple(2, amount("50.00")?, day(3)?)?,
        ReceiptRecord::simple(3, amount("50.00")?, day(5)?)?,
    ];

    // 3. Reconcile
    let config = ReconciliationConfig::default().with_date_tolerance(1);
    let reconciler = Reconciler::new(config, Arc::new(rule_set))?;
    let report = reconciler.reconcile(&entries, &receipts)?;

    println!("🔍 Results for run {}:", report.run_id);
    for result in &report.results {
        let receipt = result
            .receipt_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} {:<16} receipt {:<3} confidence {:.2}  {}",
            result.entry_id,
            result.status.as_str(),
            receipt,
            result.confidence,
            result.note
        );
    }
    println!();

    // 4. Statistics
    let stats = &report.stats;
    println!("📈 Statistics:");
    println!(
        "  Matched:      {} of {} ({:.1}%)",
        stats.matched.count, stats.total_entries, stats.matched.percentage
    );
    println!("  Auto-approve: {}", stats.auto_approved);
    println!("  Needs review: {}", stats.needs_review);
    println!("  Reconciled:   R$ {}", stats.total_reconciled_amount);
    println!(
        "  Receipts:     {} claimed, {} unclaimed",
        stats.receipts_claimed, stats.receipts_unclaimed
    );
    for (strategy, share) in &stats.by_strategy {
        println!("  {:<13} {} match(es)", strategy, share.count);
    }

    println!("\n✅ Reconciliation complete");
    Ok(())
}
