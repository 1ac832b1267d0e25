//! Tables printed after a pipeline run.

use comfy_table::{Table, presets::UTF8_FULL};

use crate::{
    plan::{PlanReport, StepStatus},
    wiring::WiringReport,
};

/// One row per step: status, address and confirmations.
pub fn deployment_summary(report: &PlanReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Step", "Contract", "Status", "Address", "Confirmations"]);

    for step in &report.steps {
        table.add_row(vec![
            step.name.clone(),
            step.contract.clone(),
            step.status.to_string(),
            step.address.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string()),
            step.confirmations.to_string(),
        ]);
    }

    table
}

/// Gas spent by deployments and applied wiring actions, with a total.
pub fn gas_report(plan: &PlanReport, wiring: &WiringReport) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Operation", "Gas used"]);

    let mut total = 0u64;

    for step in plan.steps.iter().filter(|s| s.status == StepStatus::Deployed) {
        total += step.gas_used;
        table.add_row(vec![format!("deploy {}", step.name), step.gas_used.to_string()]);
    }

    for action in wiring.actions.iter().filter(|a| a.gas_used > 0) {
        total += action.gas_used;
        table.add_row(vec![action.description.clone(), action.gas_used.to_string()]);
    }

    table.add_row(vec!["Total".to_string(), total.to_string()]);
    table
}
