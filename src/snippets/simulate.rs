//! Simulated snippet execution
//!
//! Nothing is executed. The code is matched against a small rule table per
//! language family and a plausible console line is produced for display.

use std::time::Duration;

struct Rules {
    prompt: &'static str,
    print_calls: &'static [&'static str],
    function_markers: &'static [&'static str],
    class_markers: &'static [&'static str],
}

const JAVASCRIPT: Rules = Rules {
    prompt: "> ",
    print_calls: &["console.log(", "console.info(", "console.error(", "console.warn("],
    function_markers: &["function ", "=>"],
    class_markers: &["class "],
};

const PYTHON: Rules = Rules {
    prompt: ">>> ",
    print_calls: &["print("],
    function_markers: &["def ", "lambda "],
    class_markers: &["class "],
};

const COMPILED: Rules = Rules {
    prompt: "$ ",
    print_calls: &[
        "println!(",
        "print!(",
        "fmt.Println(",
        "fmt.Printf(",
        "System.out.println(",
        "Console.WriteLine(",
        "printf(",
        "std::cout <<",
    ],
    function_markers: &["fn ", "func ", "void ", "int "],
    class_markers: &["class ", "struct ", "interface "],
};

const SHELL: Rules = Rules {
    prompt: "$ ",
    print_calls: &["echo ", "printf "],
    function_markers: &["function "],
    class_markers: &[],
};

const GENERIC_SUCCESS: &str = "Code executed successfully";

fn rules_for(language: &str) -> Option<&'static Rules> {
    match language.trim().to_lowercase().as_str() {
        "javascript" | "js" | "jsx" | "typescript" | "ts" | "tsx" | "node" => Some(&JAVASCRIPT),
        "python" | "py" | "python3" => Some(&PYTHON),
        "rust" | "rs" | "go" | "golang" | "java" | "kotlin" | "c" | "cpp" | "c++" | "csharp"
        | "cs" | "c#" | "swift" => Some(&COMPILED),
        "bash" | "sh" | "shell" | "zsh" | "console" => Some(&SHELL),
        _ => None,
    }
}

/// Fabricate the console output `code` would "produce" in `language`.
pub fn simulate(code: &str, language: &str) -> String {
    let Some(rules) = rules_for(language) else {
        return format!("{} (simulated)", GENERIC_SUCCESS);
    };

    let mut printed: Vec<(usize, String)> = rules
        .print_calls
        .iter()
        .flat_map(|call| printed_values(code, call))
        .collect();
    if !printed.is_empty() {
        printed.sort_by_key(|(pos, _)| *pos);
        return printed
            .iter()
            .map(|(_, line)| format!("{}{}", rules.prompt, line))
            .collect::<Vec<_>>()
            .join("\n");
    }

    if let Some(marker) = first_marker(code, rules.class_markers) {
        return match identifier_after(code, marker) {
            Some(name) => format!("{}Class `{}` defined", rules.prompt, name),
            None => format!("{}Class defined", rules.prompt),
        };
    }

    if let Some(marker) = first_marker(code, rules.function_markers) {
        return match identifier_after(code, marker) {
            Some(name) => format!("{}Function `{}` defined", rules.prompt, name),
            None => format!("{}Function defined", rules.prompt),
        };
    }

    format!("{}{}", rules.prompt, GENERIC_SUCCESS)
}

/// Wait `delay` to mimic execution latency, then [`simulate`].
pub async fn run(code: &str, language: &str, delay: Duration) -> String {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    simulate(code, language)
}

fn first_marker(code: &str, markers: &[&'static str]) -> Option<&'static str> {
    markers
        .iter()
        .filter_map(|marker| code.find(marker).map(|pos| (pos, *marker)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, marker)| marker)
}

fn printed_values(code: &str, call: &str) -> Vec<(usize, String)> {
    code.match_indices(call)
        .map(|(pos, _)| {
            let rest = &code[pos + call.len()..];
            let value = string_literal(rest)
                .or_else(|| bare_word_argument(call, rest))
                .unwrap_or_else(|| "output".to_string());
            (pos, value)
        })
        .collect()
}

/// First quoted literal at the start of `rest`, ignoring leading whitespace.
fn string_literal(rest: &str) -> Option<String> {
    let rest = rest.trim_start();
    let quote = rest.chars().next().filter(|c| matches!(c, '"' | '\'' | '`'))?;

    let mut value = String::new();
    let mut chars = rest[quote.len_utf8()..].chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                other => value.push(other),
            },
            c if c == quote => return Some(value),
            c => value.push(c),
        }
    }
    None
}

// `echo hello world` has no quotes; echo the rest of the line.
fn bare_word_argument(call: &str, rest: &str) -> Option<String> {
    if !call.ends_with(' ') {
        return None;
    }
    let line = rest.lines().next()?.trim();
    (!line.is_empty()).then(|| line.to_string())
}

// Only keyword markers (`def `, `class `) are followed by a name.
fn identifier_after(code: &str, marker: &str) -> Option<String> {
    if !marker.ends_with(' ') {
        return None;
    }
    let pos = code.find(marker)?;
    let name: String = code[pos + marker.len()..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_javascript_console_log() {
        let output = simulate("console.log('x')", "javascript");
        assert!(output.starts_with("> "));
        assert_eq!(output, "> x");
    }

    #[test]
    fn test_python_function_definition() {
        let output = simulate("def f(): pass", "python");
        assert!(output.starts_with(">>> "));
        assert_eq!(output, ">>> Function `f` defined");
    }

    #[test]
    fn test_python_print_lines() {
        let output = simulate("print(\"a\")\nprint('b')", "py");
        assert_eq!(output, ">>> a\n>>> b");
    }

    #[test]
    fn test_class_wins_over_method() {
        let code = "class Greeter {\n  function hello() {}\n}";
        assert_eq!(simulate(code, "js"), "> Class `Greeter` defined");
    }

    #[test]
    fn test_arrow_function_without_name() {
        assert_eq!(simulate("(a, b) => a + b", "typescript"), "> Function defined");
    }

    #[test]
    fn test_mixed_log_calls_keep_source_order() {
        let code = "console.error('first');\nconsole.log('second');";
        assert_eq!(simulate(code, "js"), "> first\n> second");
    }

    #[test]
    fn test_print_of_non_literal() {
        assert_eq!(simulate("console.log(value)", "js"), "> output");
    }

    #[test]
    fn test_rust_println() {
        let code = "fn main() {\n    println!(\"hello\");\n}";
        assert_eq!(simulate(code, "Rust"), "$ hello");
    }

    #[test]
    fn test_shell_echo() {
        assert_eq!(simulate("echo hello world", "bash"), "$ hello world");
        assert_eq!(simulate("echo \"quoted\"", "sh"), "$ quoted");
    }

    #[test]
    fn test_unmatched_code_is_generic_success() {
        assert_eq!(simulate("x = 1", "python"), ">>> Code executed successfully");
        assert_eq!(simulate("let x = 1;", "js"), "> Code executed successfully");
    }

    #[test]
    fn test_unknown_language() {
        let output = simulate("SELECT 1;", "sql");
        assert!(output.contains("executed successfully"));
        assert!(!output.starts_with('>'));
    }

    #[test]
    fn test_unterminated_literal_falls_back() {
        assert_eq!(simulate("print('oops", "python"), ">>> output");
    }

    #[test]
    fn test_run_without_delay() {
        let output = tokio_test::block_on(run("print('hi')", "python", Duration::ZERO));
        assert_eq!(output, ">>> hi");
    }

    #[tokio::test]
    async fn test_run_waits_for_delay() {
        let started = tokio::time::Instant::now();
        let output = run("console.log('x')", "js", Duration::from_millis(20)).await;
        assert_eq!(output, "> x");
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
