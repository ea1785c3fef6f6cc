/// Rhai-backed [`ScriptEvaluator`].
///
/// The interpreter is locked down: `eval` is disabled, `import` resolves
/// nothing, and `print`/`debug` go to the log instead of stdout. Rhai has
/// no built-in filesystem or process access, so a script can only compute
/// a string from the variables it is given.
///
/// Values are capped in size and nesting, so a runaway script fails its own
/// item instead of exhausting memory. The evaluator shares the engine's abort
/// flag through Rhai's progress hook, which lets an abort interrupt a script
/// that never returns.
use super::{EvalOutcome, ItemContext, ScriptEvaluator, ScriptSyntaxError};
use crate::model::ItemKind;
use parking_lot::Mutex;
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Dynamic, Engine, ParseError, Scope, AST};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Largest string a script may build, in bytes. Far above any path length.
const MAX_STRING_SIZE: usize = 64 * 1024;
const MAX_ARRAY_SIZE: usize = 10_000;
const MAX_MAP_SIZE: usize = 10_000;
const MAX_CALL_LEVELS: usize = 32;
/// Expression nesting at global level and inside functions.
const MAX_EXPR_DEPTHS: (usize, usize) = (64, 32);

pub struct RhaiEvaluator {
    engine: Engine,
    /// Last compiled script, reused while the source is unchanged.
    compiled: Mutex<Option<(String, Arc<AST>)>>,
}

impl Default for RhaiEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl RhaiEvaluator {
    /// Evaluator that can only be interrupted between items.
    pub fn new() -> Self {
        Self::with_abort_flag(Arc::new(AtomicBool::new(false)))
    }

    /// Evaluator whose running script terminates as soon as `abort` is set.
    pub fn with_abort_flag(abort: Arc<AtomicBool>) -> Self {
        let mut engine = Engine::new();
        engine.set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");
        engine
            .set_max_string_size(MAX_STRING_SIZE)
            .set_max_array_size(MAX_ARRAY_SIZE)
            .set_max_map_size(MAX_MAP_SIZE)
            .set_max_call_levels(MAX_CALL_LEVELS)
            .set_max_expr_depths(MAX_EXPR_DEPTHS.0, MAX_EXPR_DEPTHS.1);
        engine.on_print(|text| debug!(target: "renamesleuth::script", "{text}"));
        engine.on_debug(|text, _source, pos| {
            debug!(target: "renamesleuth::script", "[{pos}] {text}");
        });
        engine.on_progress(move |_operations| {
            if abort.load(Ordering::Relaxed) {
                Some(Dynamic::UNIT)
            } else {
                None
            }
        });

        Self {
            engine,
            compiled: Mutex::new(None),
        }
    }

    fn compile(&self, script: &str) -> Result<Arc<AST>, ScriptSyntaxError> {
        let mut cache = self.compiled.lock();
        if let Some((source, ast)) = cache.as_ref() {
            if source == script {
                return Ok(ast.clone());
            }
        }
        let ast = Arc::new(self.engine.compile(script).map_err(|e| syntax_error(&e))?);
        *cache = Some((script.to_string(), ast.clone()));
        Ok(ast)
    }
}

impl ScriptEvaluator for RhaiEvaluator {
    fn check_syntax(&self, script: &str) -> Result<(), ScriptSyntaxError> {
        self.compile(script).map(|_| ())
    }

    fn evaluate(&self, script: &str, item: &ItemContext) -> EvalOutcome {
        let ast = match self.compile(script) {
            Ok(ast) => ast,
            Err(err) => return EvalOutcome::Error(err.to_string()),
        };

        // Fresh scope per item: nothing leaks from one invocation to the next.
        let mut scope = Scope::new();
        scope
            .push("name", item.name.clone())
            .push("base_name", item.base_name.clone())
            .push("extension", item.extension.clone())
            .push("path", item.path.clone())
            .push("parent_path", item.parent_path.clone())
            .push("relative_path", item.relative_path.clone())
            .push("is_dir", item.kind == ItemKind::Directory)
            .push("is_file", item.kind == ItemKind::File)
            .push("index", item.index as rhai::INT);

        match self.engine.eval_ast_with_scope::<Dynamic>(&mut scope, &ast) {
            Ok(value) if value.is_unit() => EvalOutcome::Skip,
            Ok(value) => {
                let type_name = value.type_name();
                match value.into_string() {
                    Ok(path) if path.trim().is_empty() => EvalOutcome::Skip,
                    Ok(path) => EvalOutcome::Rename(path),
                    Err(_) => EvalOutcome::Error(format!(
                        "script must return a string or (), got {type_name}"
                    )),
                }
            }
            Err(err) => EvalOutcome::Error(err.to_string()),
        }
    }
}

fn syntax_error(err: &ParseError) -> ScriptSyntaxError {
    let pos = err.position();
    ScriptSyntaxError {
        line: pos.line().unwrap_or(1),
        column: pos.position().unwrap_or(1),
        message: err.err_type().to_string(),
    }
}
