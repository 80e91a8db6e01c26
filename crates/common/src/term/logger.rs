use std::fmt::Display;

use cliclack::{intro as cliclack_intro, log, outro as cliclack_outro};
use console::{style, Term};
use serde::Serialize;

fn term_write(msg: impl Display) {
    let msg = &format!("{}", msg);
    Term::stderr().write_str(msg).unwrap();
}

pub fn intro() {
    cliclack_intro(style(" routerctl ").on_cyan().black()).unwrap();
}

pub fn outro(msg: impl Display) {
    cliclack_outro(msg).unwrap();
}

pub fn info(msg: impl Display) {
    log::info(msg).unwrap();
}

pub fn warn(msg: impl Display) {
    log::warning(msg).unwrap();
}

pub fn error(msg: impl Display) {
    log::error(style(msg).red()).unwrap();
}

pub fn success(msg: impl Display) {
    log::success(msg).unwrap();
}

pub fn note(msg: impl Display, content: impl Display) {
    cliclack::note(msg, content).unwrap();
}

pub fn error_note(msg: &str, content: &str) {
    log::error(format!("{}\n{}", style(msg).red().bold(), content)).unwrap();
}

pub fn object_to_string(obj: impl Serialize) -> String {
    let json = match serde_json::to_value(obj) {
        Ok(json) => json,
        Err(err) => return format!("<unprintable: {err}>"),
    };

    fn print_object(key: &str, value: &str, indentation: usize) -> String {
        format!(
            "{:indent$}∙ {} {}\n",
            "",
            style(format!("{key}:")).bold(),
            style(value),
            indent = indentation
        )
    }

    fn print_header(header: &str, indentation: usize) -> String {
        format!(
            "{:indent$}∙ {}\n",
            "",
            style(format!("{header}:")).bold(),
            indent = indentation
        )
    }

    fn traverse_json(json: &serde_json::Value, indent: usize) -> String {
        let mut values = String::new();

        match json {
            serde_json::Value::Object(obj) => {
                for (key, value) in obj {
                    match value {
                        serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                            values.push_str(&print_header(key, indent));
                            values.push_str(&traverse_json(value, indent + 2));
                        }
                        serde_json::Value::String(s) => {
                            values.push_str(&print_object(key, s, indent))
                        }
                        _ => values.push_str(&print_object(key, &value.to_string(), indent)),
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    match item {
                        serde_json::Value::String(s) => {
                            values.push_str(&print_object(&i.to_string(), s, indent))
                        }
                        serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                            values.push_str(&print_header(&i.to_string(), indent));
                            values.push_str(&traverse_json(item, indent + 2));
                        }
                        _ => values.push_str(&print_object(&i.to_string(), &item.to_string(), indent)),
                    }
                }
            }
            _ => {}
        }

        values
    }

    traverse_json(&json, 2)
}

pub fn new_empty_line() {
    term_write("\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Output {
        executors: Vec<&'static str>,
        network: &'static str,
        salt_hash: Option<u64>,
    }

    #[test]
    fn messages_reach_the_terminal() {
        new_empty_line();
        info("reconciling Bsc");
        warn("Bsc v3: wrapped token differs");
        let output = Output {
            executors: vec![],
            network: "Bsc",
            salt_hash: Some(1),
        };
        note("Deployment", object_to_string(output));
    }

    #[test]
    fn nested_values_are_indented() {
        let rendered = object_to_string(Output {
            executors: vec!["TAbc", "TDef"],
            network: "Tron",
            salt_hash: None,
        });
        assert_eq!(
            console::strip_ansi_codes(&rendered),
            "  ∙ executors:\n    ∙ 0: TAbc\n    ∙ 1: TDef\n  ∙ network: Tron\n  ∙ salt_hash: null\n"
        );
    }
}
