/// Code step sandbox
///
/// User code runs in an embedded Lua 5.4 interpreter. The script must define
/// `function code(inputs)`; its return value becomes the step output. Each
/// execution gets a fresh interpreter with filesystem, process and module
/// loading globals removed, a memory limit and an instruction-count deadline.

use crate::config::DEFAULT_CODE_MEMORY_LIMIT;
use anyhow::Result;
use async_trait::async_trait;
use mlua::LuaSerdeExt;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

const HOOK_INSTRUCTION_INTERVAL: u32 = 10_000;
const HOOK_GRACE: Duration = Duration::from_secs(1);
const TIMEOUT_MESSAGE: &str = "Code execution timed out";

/// Executes user code for CODE steps
#[async_trait]
pub trait CodeSandbox: Send + Sync {
    /// Run `code` with `inputs` and return its result
    async fn run(&self, code: &str, inputs: Value) -> Result<Value>;
}

/// Lua interpreter sandbox
#[derive(Debug, Clone)]
pub struct LuaSandbox {
    /// Interpreter memory cap in bytes
    memory_limit: usize,
    timeout: Duration,
}

impl Default for LuaSandbox {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_MEMORY_LIMIT)
    }
}

impl LuaSandbox {
    pub fn new(memory_limit: usize) -> Self {
        Self {
            memory_limit,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CodeSandbox for LuaSandbox {
    async fn run(&self, code: &str, inputs: Value) -> Result<Value> {
        let code = code.to_string();
        let memory_limit = self.memory_limit;
        let deadline = Instant::now() + self.timeout;

        tracing::debug!("🧠 Running code step ({} bytes of Lua)", code.len());

        // The interpreter is not Send: create and drop it on the blocking thread
        let handle = tokio::task::spawn_blocking(move || run_lua(&code, inputs, memory_limit, deadline));
        // Backstop for host calls that never return
        let joined = tokio::time::timeout(self.timeout + HOOK_GRACE, handle)
            .await
            .map_err(|_| anyhow::anyhow!("Code execution timed out after {:?}", self.timeout))?;
        joined.map_err(|e| anyhow::anyhow!("Code execution aborted: {}", e))?
    }
}

fn run_lua(code: &str, inputs: Value, memory_limit: usize, deadline: Instant) -> Result<Value> {
    let lua = mlua::Lua::new();
    lua.set_memory_limit(memory_limit)
        .map_err(|e| anyhow::anyhow!("Failed to set Lua memory limit: {}", e))?;
    lua.set_hook(
        mlua::HookTriggers::new().every_nth_instruction(HOOK_INSTRUCTION_INTERVAL),
        move |_, _| {
            if Instant::now() >= deadline {
                Err(mlua::Error::RuntimeError(TIMEOUT_MESSAGE.to_string()))
            } else {
                Ok(mlua::VmState::Continue)
            }
        },
    )
    .map_err(|e| anyhow::anyhow!("Failed to install Lua timeout hook: {}", e))?;

    let globals = lua.globals();

    // Safe time helpers replace os.date / os.time
    globals
        .set(
            "now",
            lua.create_function(|_, ()| Ok(chrono::Utc::now().to_rfc3339()))
                .map_err(|e| anyhow::anyhow!("Failed to create now function: {}", e))?,
        )
        .map_err(|e| anyhow::anyhow!("Failed to set now function: {}", e))?;
    globals
        .set(
            "time",
            lua.create_function(|_, ()| Ok(chrono::Utc::now().timestamp()))
                .map_err(|e| anyhow::anyhow!("Failed to create time function: {}", e))?,
        )
        .map_err(|e| anyhow::anyhow!("Failed to set time function: {}", e))?;

    for name in ["os", "io", "debug", "package", "require", "dofile", "loadfile", "load", "collectgarbage"] {
        globals
            .set(name, mlua::Nil)
            .map_err(|e| anyhow::anyhow!("Failed to remove global '{}': {}", name, e))?;
    }

    lua.load(code)
        .set_name("code")
        .exec()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let entry: mlua::Function = globals
        .get("code")
        .map_err(|_| anyhow::anyhow!("Code must define a function named 'code'"))?;

    let lua_inputs = lua
        .to_value(&inputs)
        .map_err(|e| anyhow::anyhow!("Failed to pass inputs to code: {}", e))?;
    let result: mlua::Value = entry.call(lua_inputs).map_err(|e| anyhow::anyhow!("{}", e))?;

    to_step_output(result)
}

/// Step output for a value returned by `code`. A table whose keys are exactly
/// `1..=n` is a list; any other table is an object keyed by its string or
/// numeric keys.
fn to_step_output(value: mlua::Value) -> Result<Value> {
    Ok(match value {
        mlua::Value::Boolean(flag) => Value::Bool(flag),
        mlua::Value::Integer(n) => json!(n),
        mlua::Value::Number(n) => serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number),
        mlua::Value::String(text) => Value::String(utf8(&text)?),
        mlua::Value::Table(table) => match sequence_len(&table)? {
            Some(len) => Value::Array(
                (1..=len)
                    .map(|i| table.raw_get(i).map_err(lua_error).and_then(to_step_output))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => {
                let mut fields = serde_json::Map::new();
                for entry in table.pairs::<mlua::Value, mlua::Value>() {
                    let (key, field) = entry.map_err(lua_error)?;
                    let key = match key {
                        mlua::Value::String(name) => utf8(&name)?,
                        mlua::Value::Integer(n) => n.to_string(),
                        mlua::Value::Number(n) => n.to_string(),
                        // Boolean, table and function keys have no JSON form
                        _ => continue,
                    };
                    fields.insert(key, to_step_output(field)?);
                }
                Value::Object(fields)
            }
        },
        // nil, functions, userdata and coroutines
        _ => Value::Null,
    })
}

fn lua_error(e: mlua::Error) -> anyhow::Error {
    anyhow::anyhow!("Failed to read code result: {}", e)
}

fn utf8(text: &mlua::String) -> Result<String> {
    Ok(text.to_str().map_err(lua_error)?.to_string())
}

/// `Some(n)` when the table is a non-empty sequence `1..=n`
fn sequence_len(table: &mlua::Table) -> Result<Option<usize>> {
    let (mut entries, mut highest) = (0usize, 0i64);
    for entry in table.pairs::<mlua::Value, mlua::Value>() {
        match entry.map_err(lua_error)?.0 {
            mlua::Value::Integer(n) if n > 0 => highest = highest.max(n),
            _ => return Ok(None),
        }
        entries += 1;
    }
    Ok((entries > 0 && entries as i64 == highest).then_some(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn code_receives_inputs_and_returns_json() {
        let sandbox = LuaSandbox::default();
        let code = r#"
            function code(inputs)
                local doubled = {}
                for i, v in ipairs(inputs.numbers) do
                    doubled[i] = v * 2
                end
                return { doubled = doubled, greeting = "hi " .. inputs.name }
            end
        "#;
        let out = sandbox
            .run(code, json!({"numbers": [1, 2, 3], "name": "Ada"}))
            .await
            .unwrap();
        assert_eq!(out, json!({"doubled": [2, 4, 6], "greeting": "hi Ada"}));
    }

    #[tokio::test]
    async fn dangerous_globals_are_removed() {
        let sandbox = LuaSandbox::default();
        let out = sandbox
            .run("function code(inputs) return os == nil and io == nil and require == nil end", json!({}))
            .await
            .unwrap();
        assert_eq!(out, json!(true));
    }

    #[tokio::test]
    async fn errors_are_reported() {
        let sandbox = LuaSandbox::default();
        let err = sandbox
            .run("function code(inputs) error('bad input') end", json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad input"));

        let missing = sandbox.run("local x = 1", json!({})).await.unwrap_err();
        assert!(missing.to_string().contains("'code'"));
    }

    #[tokio::test]
    async fn endless_loop_is_aborted_inside_the_interpreter() {
        let sandbox = LuaSandbox::default().with_timeout(Duration::from_millis(200));

        let err = sandbox
            .run("function code(inputs) while true do end end", json!({}))
            .await
            .unwrap_err();

        // Raised by the instruction hook, not by the outer tokio timeout
        assert!(err.to_string().contains(TIMEOUT_MESSAGE));
        assert!(!err.to_string().contains("timed out after"));
    }

    #[test]
    fn runtime_shuts_down_after_endless_loop() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let started = Instant::now();

        let result = runtime.block_on(
            LuaSandbox::default()
                .with_timeout(Duration::from_millis(200))
                .run("function code(inputs) while true do end end", json!({})),
        );
        drop(runtime);

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn tables_map_to_lists_and_objects() {
        let sandbox = LuaSandbox::default();
        let out = sandbox
            .run(
                "function code(inputs) return { list = {1, 2.5, 'x'}, sparse = {[1] = 'a', [3] = 'c'}, empty = {} } end",
                json!({}),
            )
            .await
            .unwrap();

        assert_eq!(out["list"], json!([1, 2.5, "x"]));
        assert_eq!(out["sparse"], json!({ "1": "a", "3": "c" }));
        assert_eq!(out["empty"], json!({}));
    }
}
