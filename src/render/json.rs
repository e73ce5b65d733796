//! `plan_json` template: the compiled plan as pretty JSON, with its fingerprint.

use super::RenderError;
use crate::core::fingerprint::plan_fingerprint;
use crate::core::types::CompiledPlan;
use serde::Serialize;

#[derive(Serialize)]
struct PlanDocument<'a> {
    generator: String,
    fingerprint: String,
    plan: &'a CompiledPlan,
}

pub fn render(plan: &CompiledPlan) -> Result<String, RenderError> {
    let doc = PlanDocument {
        generator: format!("querygen {}", env!("CARGO_PKG_VERSION")),
        fingerprint: plan_fingerprint(plan)?,
        plan,
    };
    let mut out = serde_json::to_string_pretty(&doc)?;
    out.push('\n');
    Ok(out)
}
