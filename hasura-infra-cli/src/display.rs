//! Terminal rendering of plans and values

use std::cmp::Ordering;
use std::collections::HashMap;

use colored::Colorize;
use hasura_infra_core::effect::Effect;
use hasura_infra_core::plan::Plan;
use hasura_infra_core::resource::Value;
use hasura_infra_stacks::Unit;

const ATTR_INDENT: &str = "      ";

/// `name` first, then alphabetical; internal keys are hidden
fn sorted_keys(attributes: &HashMap<String, Value>) -> Vec<&String> {
    let mut keys: Vec<&String> = attributes.keys().filter(|k| !k.starts_with('_')).collect();
    keys.sort_by(|a, b| match (a.as_str(), b.as_str()) {
        ("name", _) => Ordering::Less,
        (_, "name") => Ordering::Greater,
        _ => a.cmp(b),
    });
    keys
}

pub fn print_plan(unit: Unit, plan: &Plan) {
    println!("{} {}", "Unit:".cyan().bold(), unit.as_str().bold());

    if plan.is_noop() {
        println!("  {}", "No changes. Infrastructure is up-to-date.".green());
        println!();
        return;
    }

    for effect in plan.effects() {
        let symbol = match effect {
            Effect::Create(_) => "+".green().bold(),
            Effect::Update { .. } => "~".yellow().bold(),
            Effect::Replace { .. } => "-/+".red().bold(),
            Effect::Delete { .. } => "-".red().bold(),
            Effect::Retain { .. } => "=".blue().bold(),
            Effect::Read(_) => "<=".normal(),
        };
        let id = effect.resource_id();
        println!(
            "  {} {}.{}",
            symbol,
            id.resource_type.cyan().bold(),
            id.name
        );

        match effect {
            Effect::Create(r) => {
                for key in sorted_keys(&r.attributes) {
                    println!(
                        "{}{}: {}",
                        ATTR_INDENT,
                        key,
                        format_value(&r.attributes[key]).green()
                    );
                }
            }
            Effect::Update { from, to, .. } | Effect::Replace { from, to, .. } => {
                for key in sorted_keys(&to.attributes) {
                    let new_value = &to.attributes[key];
                    let old_value = from.attributes.get(key);
                    if old_value == Some(new_value) {
                        continue;
                    }
                    let old_str = old_value
                        .map(format_value)
                        .unwrap_or_else(|| "(none)".to_string());
                    println!(
                        "{}{}: {} → {}",
                        ATTR_INDENT,
                        key,
                        old_str.red(),
                        format_value(new_value).green()
                    );
                }
            }
            Effect::Retain { .. } => {
                println!(
                    "{}{}",
                    ATTR_INDENT,
                    "retained: removed from state, left in place".blue()
                );
            }
            Effect::Delete { .. } | Effect::Read(_) => {}
        }
    }

    println!();
    let summary = plan.summary();
    print!(
        "Plan: {} to add, {} to change, {} to destroy",
        (summary.create + summary.replace).to_string().green(),
        summary.update.to_string().yellow(),
        (summary.delete + summary.replace).to_string().red()
    );
    if summary.retain > 0 {
        print!(", {} to retain", summary.retain.to_string().blue());
    }
    println!(".");
    println!();
}

pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let strs: Vec<_> = keys
                .into_iter()
                .map(|k| format!("{}: {}", k, format_value(&map[k])))
                .collect();
            format!("{{{}}}", strs.join(", "))
        }
        Value::ResourceRef(binding, attr) => format!("{}.{}", binding, attr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_render_compactly() {
        assert_eq!(format_value(&Value::string("10.0.0.0/16")), "\"10.0.0.0/16\"");
        assert_eq!(format_value(&Value::Int(5432)), "5432");
        assert_eq!(
            format_value(&Value::strings(["a", "b"])),
            "[\"a\", \"b\"]"
        );
        assert_eq!(
            format_value(&Value::ResourceRef("hasura-dev-vpc".into(), "id".into())),
            "hasura-dev-vpc.id"
        );
    }

    #[test]
    fn maps_render_sorted() {
        let value = Value::map([
            ("Project", Value::string("hasura")),
            ("Environment", Value::string("dev")),
        ]);
        assert_eq!(
            format_value(&value),
            "{Environment: \"dev\", Project: \"hasura\"}"
        );
    }

    #[test]
    fn name_sorts_first_and_internal_keys_hide() {
        let attributes: HashMap<String, Value> = [
            ("vpc_id", Value::string("vpc-1")),
            ("name", Value::string("sg")),
            ("_unit", Value::string("network")),
            ("description", Value::string("d")),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let keys: Vec<&str> = sorted_keys(&attributes).into_iter().map(String::as_str).collect();
        assert_eq!(keys, vec!["name", "description", "vpc_id"]);
    }
}
