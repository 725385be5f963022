//! Interpreter boundary
//!
//! The host treats the script engine as a black box behind [`Interpreter`].
//! [`RhaiInterpreter`] installs a [`Namespace`] as the static module `nexus`
//! (`nexus::http::get(url)`); functions flagged as methods are additionally
//! callable on maps (`doc.select("a")`).
//!
//! Capability errors leave the engine as `ErrorSystem`, which rhai's
//! `try/catch` does not intercept, and are unwrapped again on the way out.

use crate::error::CapabilityError;
use crate::namespace::{HostFunction, Namespace, ROOT};
use crate::output::{write_line, Sink};
use rhai::serde::{from_dynamic, to_dynamic};
use rhai::{
    Array, Dynamic, Engine, EvalAltResult, FuncRegistration, Map, Module, Position, Scope, AST,
};
use serde_json::Value;
use tracing::{debug, warn};

/// Host functions are callable with up to this many arguments. Every
/// function is registered for all of them so a wrong argument count reaches
/// [`HostFunction::call`] and fails as a capability fault.
const MAX_ARITY: usize = 3;

/// Read-only values injected into every run
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
    pub command: &'a str,
    pub args: &'a [String],
}

/// How a script execution failed
#[derive(Debug)]
pub enum EngineFault {
    /// Thrown by the script, or the script itself is broken
    Exception { message: String, stack: Vec<String> },
    /// A host function failed
    Capability(CapabilityError),
}

pub trait Interpreter: Send {
    /// Make the function definitions in `source` visible to every later run.
    /// Returns how many functions were loaded.
    fn load_prelude(&mut self, name: &str, source: &str) -> Result<usize, EngineFault>;

    /// Run `source` and return the value of its final expression
    fn execute(
        &mut self,
        name: &str,
        source: &str,
        bindings: &Bindings<'_>,
    ) -> Result<Value, EngineFault>;
}

pub struct RhaiInterpreter {
    engine: Engine,
    prelude: Option<AST>,
}

impl RhaiInterpreter {
    /// Engine with `namespace` installed; `print`/`debug` go to `out`
    pub fn new(namespace: &Namespace, out: Sink) -> Self {
        let mut engine = Engine::new();
        let mut root = Module::new();

        for module in namespace.modules() {
            let mut sub = Module::new();
            for function in module.functions() {
                if *function.arity().end() > MAX_ARITY {
                    warn!(
                        function = function.qualified_name(),
                        "arity above {} not reachable",
                        MAX_ARITY
                    );
                }
                for arity in 0..=MAX_ARITY {
                    set_module_fn(&mut sub, function, arity);
                    if function.is_method() {
                        set_method_fn(&mut engine, function, arity);
                    }
                }
            }
            debug!(module = module.key(), "module installed");
            root.set_sub_module(module.key(), sub);
        }
        engine.register_static_module(ROOT, root.into());

        let print_out = out.clone();
        engine.on_print(move |text| write_line(&print_out, text));
        engine.on_debug(move |text, source, pos| {
            let origin = source.unwrap_or("script");
            write_line(&out, &format!("[debug] {} @ {}: {}", origin, pos, text));
        });

        Self {
            engine,
            prelude: None,
        }
    }

    fn compile(&self, name: &str, source: &str) -> Result<AST, EngineFault> {
        let mut ast = self
            .engine
            .compile(source)
            .map_err(|e| EngineFault::Exception {
                message: format!("{}: {}", name, e),
                stack: Vec::new(),
            })?;
        ast.set_source(name);
        Ok(ast)
    }
}

impl Interpreter for RhaiInterpreter {
    fn load_prelude(&mut self, name: &str, source: &str) -> Result<usize, EngineFault> {
        let functions = self.compile(name, source)?.clone_functions_only();
        let count = functions.iter_functions().count();
        self.prelude = Some(functions);
        Ok(count)
    }

    fn execute(
        &mut self,
        name: &str,
        source: &str,
        bindings: &Bindings<'_>,
    ) -> Result<Value, EngineFault> {
        let script = self.compile(name, source)?;
        let ast = match &self.prelude {
            Some(prelude) => prelude.merge(&script),
            None => script,
        };

        let mut scope = Scope::new();
        let args: Array = bindings
            .args
            .iter()
            .map(|arg| Dynamic::from(arg.clone()))
            .collect();
        scope.push_constant("COMMAND", bindings.command.to_string());
        scope.push_constant("ARGS", args);

        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
            .map_err(classify)?;

        Ok(from_dynamic::<Value>(&result).unwrap_or_else(|_| Value::String(result.to_string())))
    }
}

fn set_module_fn(module: &mut Module, function: &HostFunction, arity: usize) {
    let f = function.clone();
    let registration = FuncRegistration::new(function.name());
    match arity {
        0 => {
            registration.set_into_module(module, move || call(&f, Vec::new()));
        }
        1 => {
            registration.set_into_module(module, move |a: Dynamic| call(&f, vec![a]));
        }
        2 => {
            registration.set_into_module(module, move |a: Dynamic, b: Dynamic| {
                call(&f, vec![a, b])
            });
        }
        3 => {
            registration.set_into_module(module, move |a: Dynamic, b: Dynamic, c: Dynamic| {
                call(&f, vec![a, b, c])
            });
        }
        _ => {}
    }
}

/// Method form: the receiver is a map (documents and elements are maps)
fn set_method_fn(engine: &mut Engine, function: &HostFunction, arity: usize) {
    let f = function.clone();
    let name = function.name();
    match arity {
        0 => {}
        1 => {
            engine.register_fn(name, move |this: Map| call(&f, vec![Dynamic::from_map(this)]));
        }
        2 => {
            engine.register_fn(name, move |this: Map, a: Dynamic| {
                call(&f, vec![Dynamic::from_map(this), a])
            });
        }
        3 => {
            engine.register_fn(name, move |this: Map, a: Dynamic, b: Dynamic| {
                call(&f, vec![Dynamic::from_map(this), a, b])
            });
        }
        _ => {}
    }
}

fn call(function: &HostFunction, args: Vec<Dynamic>) -> Result<Dynamic, Box<EvalAltResult>> {
    let mut values = Vec::with_capacity(args.len());
    for (index, arg) in args.iter().enumerate() {
        let value = from_dynamic::<Value>(arg).map_err(|e| {
            fault(CapabilityError::invalid(
                function.qualified_name(),
                format!("argument {} cannot cross the boundary: {}", index + 1, e),
            ))
        })?;
        values.push(value);
    }

    let result = function.call(&values).map_err(fault)?;
    to_dynamic(result)
}

fn fault(err: CapabilityError) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorSystem(
        "capability fault".to_string(),
        Box::new(err),
    ))
}

fn classify(err: Box<EvalAltResult>) -> EngineFault {
    let mut stack = Vec::new();
    let mut current = err;
    loop {
        current = match *current {
            EvalAltResult::ErrorInFunctionCall(function, source, inner, pos) => {
                stack.push(frame(&function, &source, pos));
                inner
            }
            EvalAltResult::ErrorInModule(_, inner, _) => inner,
            EvalAltResult::ErrorSystem(message, inner) => {
                return match inner.downcast::<CapabilityError>() {
                    Ok(fault) => EngineFault::Capability(*fault),
                    Err(other) => EngineFault::Exception {
                        message: format!("{}: {}", message, other),
                        stack,
                    },
                };
            }
            EvalAltResult::ErrorRuntime(value, pos) => {
                return EngineFault::Exception {
                    message: at(value.to_string(), pos),
                    stack,
                };
            }
            other => {
                return EngineFault::Exception {
                    message: other.to_string(),
                    stack,
                };
            }
        };
    }
}

fn frame(function: &str, source: &str, pos: Position) -> String {
    match (source.is_empty(), pos.is_none()) {
        (true, true) => format!("at {}", function),
        (true, false) => format!("at {} ({})", function, pos),
        (false, true) => format!("at {} ({})", function, source),
        (false, false) => format!("at {} ({}, {})", function, source, pos),
    }
}

fn at(message: String, pos: Position) -> String {
    if pos.is_none() {
        message
    } else {
        format!("{} ({})", message, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MemorySink;
    use serde_json::json;

    fn namespace() -> Namespace {
        let mut ns = Namespace::new();
        ns.module("math")
            .function("add", 2..=2, |args| {
                Ok(json!(args.u64(0)? + args.u64(1)?))
            })
            .function("fail", 0..=1, |args| Err(args.invalid("always fails")));
        ns.module("obj")
            .function("make", 1..=1, |args| Ok(json!({ "kind": "thing", "name": args.string(0)? })))
            .method("label", 1..=2, |args| {
                let name = args.value(0)["name"].as_str().unwrap_or("?").to_string();
                match args.opt_string(1)? {
                    Some(suffix) => Ok(json!(format!("{}{}", name, suffix))),
                    None => Ok(json!(name)),
                }
            });
        ns
    }

    fn interpreter() -> (MemorySink, RhaiInterpreter) {
        let out = MemorySink::new();
        let interpreter = RhaiInterpreter::new(&namespace(), out.sink());
        (out, interpreter)
    }

    fn no_args() -> Bindings<'static> {
        Bindings {
            command: "",
            args: &[],
        }
    }

    #[test]
    fn test_qualified_call_and_final_value() {
        let (_out, mut rhai) = interpreter();
        let value = rhai
            .execute("t", "let x = nexus::math::add(2, 3); x * 10", &no_args())
            .unwrap();
        assert_eq!(value, json!(50));
    }

    #[test]
    fn test_unit_result_is_null() {
        let (_out, mut rhai) = interpreter();
        assert_eq!(rhai.execute("t", "let x = 1;", &no_args()).unwrap(), Value::Null);
    }

    #[test]
    fn test_method_style_call() {
        let (_out, mut rhai) = interpreter();
        let value = rhai
            .execute(
                "t",
                r#"let o = nexus::obj::make("box"); [o.label(), o.label("!"), nexus::obj::label(o)]"#,
                &no_args(),
            )
            .unwrap();
        assert_eq!(value, json!(["box", "box!", "box"]));
    }

    #[test]
    fn test_bindings_are_constants() {
        let (_out, mut rhai) = interpreter();
        let args = vec!["a".to_string(), "b".to_string()];
        let bindings = Bindings {
            command: "greet",
            args: &args,
        };
        let value = rhai
            .execute("t", "`${COMMAND}:${ARGS.len()}:${ARGS[1]}`", &bindings)
            .unwrap();
        assert_eq!(value, json!("greet:2:b"));

        let err = rhai.execute("t", "ARGS = [];", &bindings).unwrap_err();
        assert!(matches!(err, EngineFault::Exception { .. }));
    }

    #[test]
    fn test_throw_is_exception_with_value() {
        let (_out, mut rhai) = interpreter();
        match rhai.execute("t", r#"throw "boom";"#, &no_args()).unwrap_err() {
            EngineFault::Exception { message, .. } => assert!(message.contains("boom")),
            other => panic!("unexpected fault: {:?}", other),
        }
    }

    #[test]
    fn test_throw_inside_function_has_stack() {
        let (_out, mut rhai) = interpreter();
        let source = "fn inner() { throw 42; }\nfn outer() { inner() }\nouter()";
        match rhai.execute("t", source, &no_args()).unwrap_err() {
            EngineFault::Exception { message, stack } => {
                assert!(message.contains("42"));
                assert_eq!(stack.len(), 2);
                assert!(stack[0].starts_with("at outer"));
                assert!(stack[1].starts_with("at inner"));
            }
            other => panic!("unexpected fault: {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_is_exception() {
        let (_out, mut rhai) = interpreter();
        match rhai.execute("broken.rhai", "let = ;", &no_args()).unwrap_err() {
            EngineFault::Exception { message, .. } => assert!(message.starts_with("broken.rhai:")),
            other => panic!("unexpected fault: {:?}", other),
        }
    }

    #[test]
    fn test_capability_fault_escapes_try_catch() {
        let (_out, mut rhai) = interpreter();
        let source = r#"
            let caught = false;
            try { nexus::math::fail(); } catch (e) { caught = true; }
            caught
        "#;
        match rhai.execute("t", source, &no_args()).unwrap_err() {
            EngineFault::Capability(CapabilityError::InvalidArgument { function, .. }) => {
                assert_eq!(function, "nexus::math::fail");
            }
            other => panic!("unexpected fault: {:?}", other),
        }
    }

    #[test]
    fn test_print_and_debug_go_to_sink() {
        let (out, mut rhai) = interpreter();
        rhai.execute("t", r#"print("hello"); debug("dbg");"#, &no_args())
            .unwrap();
        let text = out.contents();
        assert!(text.starts_with("hello\n"));
        assert!(text.contains("dbg"));
    }

    #[test]
    fn test_prelude_functions_visible() {
        let (_out, mut rhai) = interpreter();
        let count = rhai
            .load_prelude("prelude", "fn double(x) { x * 2 }\nfn shout(s) { s + \"!\" }")
            .unwrap();
        assert_eq!(count, 2);

        let value = rhai.execute("t", r#"shout("hi") + double(21)"#, &no_args()).unwrap();
        assert_eq!(value, json!("hi!42"));
        // Still there on the next run
        assert_eq!(rhai.execute("t", "double(1)", &no_args()).unwrap(), json!(2));
    }

    #[test]
    fn test_broken_prelude_rejected() {
        let (_out, mut rhai) = interpreter();
        assert!(rhai.load_prelude("prelude", "fn (").is_err());
    }

    #[test]
    fn test_wrong_arity_is_capability_fault() {
        let (_out, mut rhai) = interpreter();
        match rhai.execute("t", "nexus::math::add(1)", &no_args()).unwrap_err() {
            EngineFault::Capability(CapabilityError::InvalidArgument { function, message }) => {
                assert_eq!(function, "nexus::math::add");
                assert!(message.contains("got 1"));
            }
            other => panic!("unexpected fault: {:?}", other),
        }

        // Method form too, and try/catch does not swallow it
        let source = r#"let o = nexus::obj::make("x"); try { o.label(1, 2); } catch { }"#;
        assert!(matches!(
            rhai.execute("t", source, &no_args()).unwrap_err(),
            EngineFault::Capability(CapabilityError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_unknown_capability_function_is_script_error() {
        let (_out, mut rhai) = interpreter();
        let err = rhai.execute("t", "nexus::math::nope(1)", &no_args()).unwrap_err();
        assert!(matches!(err, EngineFault::Exception { .. }));
    }
}
