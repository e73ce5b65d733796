//! `multi_query` template: an async method on the receiver that runs every
//! group of the plan in order and assembles the output.
//!
//! The rendered file is meant to be a submodule of the module that defines
//! the receiver and the catalog types (`use super::*`).

use super::RenderError;
use crate::core::fingerprint::plan_fingerprint;
use crate::core::naming::to_snake_case;
use crate::core::types::{CompiledGroup, CompiledMember, CompiledPlan, GroupExecution, DISCARD_MARKER};
use std::path::Path;

const INDENT: &str = "        ";

pub fn render(
    plan: &CompiledPlan,
    receiver: &str,
    crate_path: &str,
    output_path: &Path,
) -> Result<String, RenderError> {
    let fingerprint = plan_fingerprint(plan)?;
    let file = output_path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut buf = String::with_capacity(2048);
    buf.push_str(&format!(
        "// Code generated by querygen {} from schema {}. DO NOT EDIT.\n",
        env!("CARGO_PKG_VERSION"),
        plan.name
    ));
    buf.push_str(&format!("// namespace: {}\n", plan.namespace));
    buf.push_str(&format!("// file: {}\n", file));
    buf.push_str(&format!("// plan: {}\n\n", fingerprint));

    buf.push_str("use super::*;\n");
    buf.push_str(&format!(
        "use {}::runtime::{{self, AggregateError, Cancellation}};\n\n",
        crate_path
    ));

    if plan.use_param_struct {
        render_param_struct(&mut buf, plan, receiver);
    }

    let method = to_snake_case(&plan.name);
    let output = if plan.output_is_ref {
        format!("Box<{}>", plan.output_type_name)
    } else {
        plan.output_type_name.clone()
    };
    let param = if plan.func_param_name.is_empty() {
        String::new()
    } else if plan.use_param_struct {
        format!(", {}: {}", plan.func_param_name, plan.func_param_type_name)
    } else {
        format!(", {}: {}", plan.func_param_name, rust_type(&plan.func_param_type_name))
    };

    buf.push_str(&format!("impl {} {{\n", receiver));
    buf.push_str("    #[allow(unused_variables)]\n");
    buf.push_str(&format!(
        "    pub async fn {}(&self, cx: &Cancellation{}) -> Result<{}, AggregateError> {{\n",
        method, param, output
    ));

    for (index, group) in plan.groups.iter().enumerate() {
        buf.push_str(&format!("{}// group {}: {}\n", INDENT, index, group.execution()));
        match group.execution() {
            GroupExecution::Transactional => render_transactional(&mut buf, plan, group),
            GroupExecution::Concurrent => render_concurrent(&mut buf, plan, group, crate_path),
            GroupExecution::Direct => render_direct(&mut buf, plan, group),
        }
        buf.push('\n');
    }

    render_output(&mut buf, plan);
    buf.push_str("    }\n}\n");
    Ok(buf)
}

fn render_param_struct(buf: &mut String, plan: &CompiledPlan, receiver: &str) {
    buf.push_str(&format!(
        "/// Parameters of [`{}::{}`].\n",
        receiver,
        to_snake_case(&plan.name)
    ));
    buf.push_str("#[derive(Debug, Clone)]\n");
    buf.push_str(&format!("pub struct {} {{\n", plan.func_param_type_name));
    for param in plan.distinct_params.values() {
        buf.push_str(&format!(
            "    pub {}: {},\n",
            param.field_name,
            rust_type(&param.type_name)
        ));
    }
    buf.push_str("}\n\n");
}

/// The member call expression, with `handle` as the receiver.
fn call_expr(member: &CompiledMember, handle: &str, cx: &str, arg: Option<&str>) -> String {
    let method = to_snake_case(&member.operation_name);
    match arg {
        Some(arg) => format!("{}.{}({}, {})", handle, method, cx, arg),
        None => format!("{}.{}({})", handle, method, cx),
    }
}

/// The member argument as an owned value.
fn owned_arg(plan: &CompiledPlan, member: &CompiledMember) -> Option<String> {
    plan.binding_expr(&member.param_binding)
        .map(|expr| format!("{}.clone()", expr))
}

fn guarded_expr(member: &CompiledMember, call: &str, cx: &str) -> String {
    format!(
        "runtime::guarded({}, \"{}\", {}).await",
        cx, member.operation_name, call
    )
}

/// Left-hand side for a member statement, if it binds anything.
fn binding(member: &CompiledMember) -> Option<&str> {
    if member.result_var_name.is_empty() {
        None
    } else {
        Some(member.result_var_name.as_str())
    }
}

fn render_direct(buf: &mut String, plan: &CompiledPlan, group: &CompiledGroup) {
    for member in &group.members {
        let arg = owned_arg(plan, member);
        let call = guarded_expr(member, &call_expr(member, "self", "cx", arg.as_deref()), "cx");
        match binding(member) {
            Some(var) => buf.push_str(&format!("{}let {} = {}?;\n", INDENT, var, call)),
            None => buf.push_str(&format!("{}{}?;\n", INDENT, call)),
        }
    }
}

fn render_transactional(buf: &mut String, plan: &CompiledPlan, group: &CompiledGroup) {
    let bound: Vec<&str> = group
        .members
        .iter()
        .filter(|m| m.binds_result())
        .map(|m| m.result_var_name.as_str())
        .collect();
    let tuple = tuple_of(&bound);

    if bound.is_empty() {
        buf.push_str(&format!("{}{{\n", INDENT));
    } else {
        buf.push_str(&format!("{}let {} = {{\n", INDENT, tuple));
    }
    buf.push_str(&format!("{}    let tx = runtime::begin(self, cx).await?;\n", INDENT));
    buf.push_str(&format!("{}    let outcome = async {{\n", INDENT));
    for member in &group.members {
        let arg = owned_arg(plan, member);
        let call = guarded_expr(member, &call_expr(member, "tx", "cx", arg.as_deref()), "cx");
        match binding(member) {
            Some(var) => buf.push_str(&format!("{}        let {} = {}?;\n", INDENT, var, call)),
            None => buf.push_str(&format!("{}        {}?;\n", INDENT, call)),
        }
    }
    buf.push_str(&format!("{}        Ok::<_, AggregateError>({})\n", INDENT, tuple));
    buf.push_str(&format!("{}    }}\n", INDENT));
    buf.push_str(&format!("{}    .await;\n", INDENT));
    if bound.is_empty() {
        buf.push_str(&format!("{}    runtime::settle_transaction(tx, outcome).await?;\n", INDENT));
        buf.push_str(&format!("{}}}\n", INDENT));
    } else {
        buf.push_str(&format!("{}    runtime::settle_transaction(tx, outcome).await?\n", INDENT));
        buf.push_str(&format!("{}}};\n", INDENT));
    }
}

fn render_concurrent(buf: &mut String, plan: &CompiledPlan, group: &CompiledGroup, crate_path: &str) {
    buf.push_str(&format!("{}let order = runtime::CompletionOrder::new();\n", INDENT));
    let mut joins = Vec::with_capacity(group.members.len());
    let mut pattern = Vec::with_capacity(group.members.len());

    for (i, member) in group.members.iter().enumerate() {
        let task = format!("task_{}", i);
        let arg = owned_arg(plan, member);
        let call = guarded_expr(
            member,
            &call_expr(member, "this", "&cx", arg.as_ref().map(|_| "arg")),
            "&cx",
        );

        buf.push_str(&format!("{}let {} = {{\n", INDENT, task));
        buf.push_str(&format!("{}    let this = self.clone();\n", INDENT));
        buf.push_str(&format!("{}    let cx = cx.clone();\n", INDENT));
        if let Some(ref arg) = arg {
            buf.push_str(&format!("{}    let arg = {};\n", INDENT, arg));
        }
        buf.push_str(&format!("{}    order.spawn(async move {{ {} }})\n", INDENT, call));
        buf.push_str(&format!("{}}};\n", INDENT));

        joins.push(format!("\"{}\" => {}", member.operation_name, task));
        pattern.push(if member.binds_result() {
            member.result_var_name.clone()
        } else {
            DISCARD_MARKER.to_string()
        });
    }

    buf.push_str(&format!(
        "{}let ({},) = {}::join_group!({})?;\n",
        INDENT,
        pattern.join(", "),
        crate_path,
        joins.join(", ")
    ));
}

fn render_output(buf: &mut String, plan: &CompiledPlan) {
    let mut fields = Vec::with_capacity(plan.output_fields.len());
    for field in &plan.output_fields {
        match field.source {
            Some(ref source) if *source == field.name => fields.push(field.name.clone()),
            Some(ref source) => fields.push(format!("{}: {}", field.name, source)),
            None => fields.push(format!("{}: Default::default()", field.name)),
        }
    }
    let value = if fields.is_empty() {
        format!("{} {{}}", plan.output_type_name)
    } else {
        format!("{} {{ {} }}", plan.output_type_name, fields.join(", "))
    };
    if plan.output_is_ref {
        buf.push_str(&format!("{}Ok(Box::new({}))\n", INDENT, value));
    } else {
        buf.push_str(&format!("{}Ok({})\n", INDENT, value));
    }
}

fn tuple_of(vars: &[&str]) -> String {
    match vars {
        [] => "()".to_string(),
        [one] => format!("({},)", one),
        many => format!("({})", many.join(", ")),
    }
}

/// Descriptor type expression → owned Rust type: `&User` → `User`,
/// `[&Post]` → `Vec<Post>`, `&str` → `String`.
pub fn rust_type(expr: &str) -> String {
    let expr = expr.trim();
    if expr == "str" {
        return "String".to_string();
    }
    if let Some(inner) = expr.strip_prefix('&') {
        return rust_type(inner);
    }
    if let Some(inner) = expr.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        return format!("Vec<{}>", rust_type(inner));
    }
    expr.to_string()
}
