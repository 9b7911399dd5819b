//! `replay types`: List the sample module's types and methods.

use crate::output::{self, StyledOutput};
use anyhow::Context;
use replay_samples::SAMPLES_MODULE;
use replay_types::TypeKind;

pub fn execute(color: &str) -> anyhow::Result<()> {
    let registry = replay_samples::registry().context("failed to load sample module")?;
    let mut out = StyledOutput::new(output::resolve_color_choice(Some(color)));

    let mut types: Vec<_> = registry
        .types()
        .into_iter()
        .filter(|def| def.module == SAMPLES_MODULE && def.token != 0)
        .collect();
    types.sort_by_key(|def| def.token);

    for def in &types {
        out.info(&format!("{:<10}", kind_label(&def.kind)));
        out.bold(&def.name);
        out.dim(&format!("  {:#010x}", def.token));
        out.newline();

        for method in registry.methods_of(def.id) {
            out.plain("    ");
            if method.is_static {
                out.dim("static ");
            }
            out.plain(&format!("{}{}", method.name, method.signature));
            if let Some(probes) = method.expected_coverage {
                out.dim(&format!("  [{} probes]", probes));
            }
            out.newline();
        }
    }
    out.flush();
    Ok(())
}

fn kind_label(kind: &TypeKind) -> &'static str {
    match kind {
        TypeKind::Class { .. } => "class",
        TypeKind::Struct => "struct",
        TypeKind::Enum { .. } => "enum",
        TypeKind::Delegate => "delegate",
        TypeKind::Array { .. } => "array",
        TypeKind::Nullable { .. } => "nullable",
        _ => "type",
    }
}
