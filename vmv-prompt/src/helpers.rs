//! Handlebars helpers registered onto the template engine: `concat` (from
//! `handlebars-concat`, pulled in the same way `elevatelaw-prompt-scaler`
//! registers it) and a custom `printf` helper for the C-style formatting
//! the prompt templates rely on.

use handlebars::{Handlebars, HelperDef, RenderErrorReason};

/// A minimal printf-equivalent: supports `%s`, `%d`, and `%.Nf` specifiers
/// applied positionally against the helper's remaining arguments.
pub struct PrintfHelper;

impl HelperDef for PrintfHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &handlebars::Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc handlebars::Context,
        _: &mut handlebars::RenderContext<'reg, 'rc>,
    ) -> Result<handlebars::ScopedJson<'rc>, handlebars::RenderError> {
        let format = h
            .param(0)
            .and_then(|p| p.value().as_str())
            .ok_or_else(|| RenderErrorReason::ParamNotFoundForIndex("printf", 0))?;
        let args: Vec<_> = h.params().iter().skip(1).collect();

        let mut output = String::with_capacity(format.len());
        let mut arg_index = 0;
        let mut chars = format.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '%' {
                output.push(c);
                continue;
            }
            let mut spec = String::new();
            for next in chars.by_ref() {
                spec.push(next);
                if next.is_ascii_alphabetic() {
                    break;
                }
            }
            let Some(value) = args.get(arg_index) else {
                output.push('%');
                output.push_str(&spec);
                continue;
            };
            arg_index += 1;
            let rendered = match spec.chars().last() {
                Some('s') => value.value().as_str().map(str::to_string).unwrap_or_else(|| value.value().to_string()),
                Some('d') => value
                    .value()
                    .as_i64()
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| value.value().to_string()),
                Some('f') => {
                    let precision: usize = spec
                        .trim_end_matches('f')
                        .trim_start_matches('.')
                        .parse()
                        .unwrap_or(6);
                    value
                        .value()
                        .as_f64()
                        .map(|n| format!("{n:.precision$}"))
                        .unwrap_or_else(|| value.value().to_string())
                }
                _ => value.value().to_string(),
            };
            output.push_str(&rendered);
        }

        Ok(handlebars::ScopedJson::Derived(serde_json::Value::String(output)))
    }
}

/// Register the `printf` helper and `handlebars-concat`'s `concat` helper
/// onto `registry`.
pub fn register_helpers(registry: &mut Handlebars<'_>) {
    registry.register_helper("printf", Box::new(PrintfHelper));
    registry.register_helper("concat", Box::new(handlebars_concat::HandlebarsConcat));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn printf_substitutes_string_and_integer_specifiers() {
        let mut hb = Handlebars::new();
        register_helpers(&mut hb);
        hb.register_template_string("t", "{{printf \"row %s, count %d\" row count}}").unwrap();
        let out = hb.render("t", &json!({"row": "A", "count": 6})).unwrap();
        assert_eq!(out, "row A, count 6");
    }

    #[test]
    fn printf_formats_floats_with_precision() {
        let mut hb = Handlebars::new();
        register_helpers(&mut hb);
        hb.register_template_string("t", "{{printf \"%.2f\" value}}").unwrap();
        let out = hb.render("t", &json!({"value": 3.14159})).unwrap();
        assert_eq!(out, "3.14");
    }
}
