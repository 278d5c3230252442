//! Engine session
//!
//! A [`Session`] owns one QuickJS runtime and context plus everything that
//! must not outlive them: the continuation queue, counters and options.
//! Bound native functions and script handles hold a [`SessionLink`], a weak
//! link back to that state, so nothing the engine keeps alive can keep the
//! session alive in turn.
//!
//! The engine scope is not re-entrant. While a script is on the stack, the
//! innermost native call records its scope and every session operation made
//! from host code underneath it reuses that scope instead of entering the
//! engine again. Such nested operations never drain the task queue; the
//! outermost call does.

use crate::binding::{bind_constructor, bind_static, HostClass, Methods, Statics};
use crate::config::SessionOptions;
use crate::decode::FromScript;
use crate::encode::{instance_to_script, to_script};
use crate::error::{caught_message, Result, ScriptError};
use crate::handles::HandleTable;
use crate::tasks::TaskQueue;
use crate::value::{ScriptKind, ScriptValue};
use conduit_metrics::Counter;
use rquickjs::convert::Coerced;
use rquickjs::function::Rest;
use rquickjs::{CatchResultExt, Context, Ctx, Function, Object, Persistent, Runtime, Value};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Tracing target for script-side `console` output.
pub const CONSOLE_TARGET: &str = "conduit_script::console";

// Host-held references (queued tasks, handles) are released in `Drop` before
// any field goes; the context then drops before the runtime.
pub(crate) struct Shared {
    tasks: TaskQueue,
    handles: HandleTable,
    active: Cell<Option<*const ()>>,
    draining: Cell<bool>,
    next_source_id: Cell<u64>,
    counters: RefCell<Counter>,
    options: SessionOptions,
    context: Context,
    runtime: Runtime,
}

impl Shared {
    fn link(self: &Rc<Self>) -> SessionLink {
        SessionLink {
            shared: Rc::downgrade(self),
        }
    }

    pub(crate) fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// True while a script is on the stack.
    pub(crate) fn is_nested(&self) -> bool {
        self.active.get().is_some()
    }

    /// Run `f` inside the engine scope, reusing the active one if a script
    /// is currently calling into the host.
    pub(crate) fn with_ctx<F, T>(self: &Rc<Self>, f: F) -> T
    where
        F: FnOnce(&Ctx<'_>) -> T,
    {
        if let Some(ptr) = self.active.get() {
            return f(active_ctx(ptr));
        }

        self.context.with(|ctx| {
            let _scope = ScopeGuard::enter(self.clone(), &ctx);
            f(&ctx)
        })
    }

    /// Run engine jobs and hooked tasks until both are exhausted.
    ///
    /// Engine jobs (promise reactions) go first; a hooked task is popped only
    /// when none are pending, and is called with the global object as its
    /// sole argument. Failures are logged and do not stop the drain.
    pub(crate) fn drain_tasks(self: &Rc<Self>) {
        if self.is_nested() || self.draining.replace(true) {
            return;
        }

        let mut drained: u64 = 0;
        loop {
            match self.runtime.execute_pending_job() {
                Ok(true) => {
                    drained += 1;
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    drained += 1;
                    tracing::warn!(error = ?err, "pending job failed");
                    continue;
                }
            }

            let Some(task) = self.tasks.pop() else {
                break;
            };
            drained += 1;

            let outcome = self.with_ctx(|ctx| -> Result<()> {
                let task = task.restore(ctx)?;
                task.call::<_, ()>((ctx.globals(),))
                    .catch(ctx)
                    .map_err(|caught| ScriptError::execution(caught_message(caught)))
            });
            if let Err(err) = outcome {
                tracing::warn!(error = %err, "queued task failed");
            }
        }

        self.draining.set(false);
        if drained > 0 {
            tracing::debug!(drained, "task queue drained");
        }
        conduit_metrics::metrics! {
            self.counters.borrow_mut().increment("tasks_drained", drained);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Finalizers run here may drop handles; their links no longer
        // upgrade, so nothing re-enters the tables being emptied.
        self.tasks.clear();
        self.handles.clear();
        self.runtime.run_gc();
    }
}

/// Re-borrow the scope recorded by a [`ScopeGuard`].
fn active_ctx<'a>(ptr: *const ()) -> &'a Ctx<'a> {
    // SAFETY: `active` only ever holds the address of a `Ctx` owned by a
    // frame that is still running (see `ScopeGuard::enter`); the guard resets
    // the cell before that frame returns, and the borrow handed out here never
    // leaves the `with_ctx` call that read the cell.
    unsafe { &*(ptr as *const Ctx<'a>) }
}

/// Weak link from bound functions and handles back to their session.
#[derive(Clone, Debug)]
pub struct SessionLink {
    shared: Weak<Shared>,
}

impl SessionLink {
    pub(crate) fn upgrade(&self) -> Result<Rc<Shared>> {
        self.shared.upgrade().ok_or(ScriptError::Disposed)
    }

    /// Whether the session behind this link still exists.
    pub(crate) fn is_alive(&self) -> bool {
        self.shared.strong_count() > 0
    }

    /// Record `ctx` as the active scope for the duration of a native call.
    pub(crate) fn enter(&self, ctx: &Ctx<'_>) -> Option<ScopeGuard> {
        let shared = self.shared.upgrade()?;
        Some(ScopeGuard::enter(shared, ctx))
    }

    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    pub(crate) fn count(&self, name: &'static str) {
        conduit_metrics::metrics! {
            if let Some(shared) = self.shared.upgrade() {
                shared.counters.borrow_mut().increment(name, 1);
            }
        }
    }

    /// A link with no session behind it, for exercising conversions against
    /// a bare engine.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self { shared: Weak::new() }
    }
}

/// Restores the previously active scope on drop.
pub(crate) struct ScopeGuard {
    shared: Rc<Shared>,
    previous: Option<*const ()>,
}

impl ScopeGuard {
    // SAFETY: the recorded address is only dereferenced through `active_ctx`
    // while this guard is alive, and every guard lives inside the frame that
    // owns `ctx`.
    fn enter(shared: Rc<Shared>, ctx: &Ctx<'_>) -> Self {
        let previous = shared
            .active
            .replace(Some(ctx as *const Ctx<'_> as *const ()));
        Self { shared, previous }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.shared.active.set(self.previous);
    }
}

/// An isolated script engine instance.
///
/// Handles ([`ScriptValue`], [`ScriptFunction`](crate::ScriptFunction))
/// produced by a session index its handle table; they may outlive it, but
/// turn inert when it goes.
pub struct Session {
    shared: Rc<Shared>,
}

impl Session {
    pub fn new() -> Result<Self> {
        Self::with_options(SessionOptions::default())
    }

    /// Create a session after letting `configure` adjust the defaults.
    pub fn configure(configure: impl FnOnce(&mut SessionOptions)) -> Result<Self> {
        let mut options = SessionOptions::default();
        configure(&mut options);
        Self::with_options(options)
    }

    pub fn with_options(options: SessionOptions) -> Result<Self> {
        let runtime = Runtime::new().map_err(|err| ScriptError::initialization(err.to_string()))?;
        if let Some(limit) = options.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(size) = options.max_stack_size {
            runtime.set_max_stack_size(size);
        }
        let context =
            Context::full(&runtime).map_err(|err| ScriptError::initialization(err.to_string()))?;

        let shared = Rc::new(Shared {
            tasks: TaskQueue::new(),
            handles: HandleTable::new(),
            active: Cell::new(None),
            draining: Cell::new(false),
            next_source_id: Cell::new(0),
            counters: RefCell::new(Counter::new()),
            options,
            context,
            runtime,
        });

        let link = shared.link();
        shared
            .with_ctx(|ctx| -> Result<()> {
                if shared.options.console {
                    install_console(ctx)?;
                }
                if let Some(hook) = &shared.options.task_hook {
                    install_task_hook(ctx, &link, hook)?;
                }
                Ok(())
            })
            .map_err(|err| ScriptError::initialization(err.to_string()))?;

        tracing::debug!(
            console = shared.options.console,
            task_hook = shared.options.task_hook.as_deref(),
            "script session ready"
        );
        Ok(Self { shared })
    }

    pub fn options(&self) -> &SessionOptions {
        &self.shared.options
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Encode `value` and expose it as a global named `name`.
    pub fn add_object<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        self.add_object_in(None, name, value)
    }

    /// Encode `value` and set it as property `name` of `parent`.
    pub fn add_object_to<T: Serialize + ?Sized>(
        &self,
        parent: &ScriptValue,
        name: &str,
        value: &T,
    ) -> Result<()> {
        self.add_object_in(Some(parent), name, value)
    }

    fn add_object_in<T: Serialize + ?Sized>(
        &self,
        parent: Option<&ScriptValue>,
        name: &str,
        value: &T,
    ) -> Result<()> {
        self.shared.with_ctx(|ctx| {
            let target = parent_object(ctx, parent)?;
            target.set(name, to_script(ctx, value)?)?;
            Ok(())
        })
    }

    /// Expose a composite host object, callables included, as a global.
    pub fn add_instance<T: HostClass>(&self, name: &str, instance: T) -> Result<()> {
        self.add_instance_in(None, name, instance)
    }

    pub fn add_instance_to<T: HostClass>(
        &self,
        parent: &ScriptValue,
        name: &str,
        instance: T,
    ) -> Result<()> {
        self.add_instance_in(Some(parent), name, instance)
    }

    fn add_instance_in<T: HostClass>(
        &self,
        parent: Option<&ScriptValue>,
        name: &str,
        instance: T,
    ) -> Result<()> {
        let link = self.shared.link();
        let methods = Methods::<T>::of();
        self.shared.with_ctx(|ctx| {
            let target = parent_object(ctx, parent)?;
            target.set(name, instance_to_script(ctx, &link, instance, &methods)?)?;
            Ok(())
        })
    }

    /// Register `T` as a constructible type under `name`, statics attached
    /// to the constructor.
    pub fn add_type<T: HostClass + Default>(&self, name: &str) -> Result<()> {
        self.add_type_in::<T>(None, name)
    }

    pub fn add_type_to<T: HostClass + Default>(&self, parent: &ScriptValue, name: &str) -> Result<()> {
        self.add_type_in::<T>(Some(parent), name)
    }

    fn add_type_in<T: HostClass + Default>(&self, parent: Option<&ScriptValue>, name: &str) -> Result<()> {
        let link = self.shared.link();
        // Shared by every instance the constructor creates
        let methods = Rc::new(Methods::<T>::of());
        let statics = Statics::of::<T>();

        self.shared.with_ctx(|ctx| -> Result<()> {
            let constructor = bind_constructor::<T>(ctx, &link, methods.clone())?;
            for binding in statics.iter() {
                let function = bind_static(ctx, &link, binding.clone())?;
                constructor.set(binding.member().resolved(), function)?;
            }
            parent_object(ctx, parent)?.set(name, constructor)?;
            Ok(())
        })?;

        tracing::debug!(
            host_type = T::NAME,
            name,
            methods = methods.len(),
            statics = statics.len(),
            "registered type"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Run `source` and return its completion value.
    ///
    /// A throw fails the call with [`ScriptError::Execution`] and leaves any
    /// queued tasks for the next call. On success the task queue is drained
    /// to a fixpoint before returning.
    pub fn execute(&self, source: &str) -> Result<ScriptValue> {
        let source_id = self.shared.next_source_id.get();
        self.shared.next_source_id.set(source_id + 1);

        let span = tracing::debug_span!("execute", source_id);
        let _enter = span.enter();

        let link = self.shared.link();
        let result = self.shared.with_ctx(|ctx| -> Result<ScriptValue> {
            let value = ctx
                .eval::<Value, _>(source)
                .catch(ctx)
                .map_err(|caught| ScriptError::execution_in(source_id, caught_message(caught)))?;
            Ok(ScriptValue::save(ctx, &link, value))
        });
        link.count("executions");

        let value = result.inspect_err(|err| tracing::debug!(error = %err, "script failed"))?;
        self.shared.drain_tasks();
        Ok(value)
    }

    /// [`execute`](Self::execute), then decode the result as `T`.
    pub fn evaluate<T: FromScript>(&self, source: &str) -> Result<T> {
        let value = self.execute(source)?;
        self.decode(&value)
    }

    // ------------------------------------------------------------------
    // Conversion
    // ------------------------------------------------------------------

    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<ScriptValue> {
        let link = self.shared.link();
        self.shared
            .with_ctx(|ctx| Ok(ScriptValue::save(ctx, &link, to_script(ctx, value)?)))
    }

    /// Encode a composite together with its callable members.
    pub fn encode_instance<T: HostClass>(&self, instance: T) -> Result<ScriptValue> {
        let link = self.shared.link();
        let methods = Methods::<T>::of();
        self.shared.with_ctx(|ctx| {
            let value = instance_to_script(ctx, &link, instance, &methods)?;
            Ok(ScriptValue::save(ctx, &link, value))
        })
    }

    pub fn decode<T: FromScript>(&self, value: &ScriptValue) -> Result<T> {
        let link = self.shared.link();
        self.shared
            .with_ctx(|ctx| T::from_script(ctx, &link, value.restore(ctx)?))
    }

    /// Decode into an untyped JSON document.
    pub fn decode_value(&self, value: &ScriptValue) -> Result<serde_json::Value> {
        self.decode(value)
    }

    pub fn global_object(&self) -> Result<ScriptValue> {
        let link = self.shared.link();
        self.shared
            .with_ctx(|ctx| Ok(ScriptValue::save(ctx, &link, ctx.globals().into_value())))
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Hooked tasks waiting for the next drain.
    pub fn pending_tasks(&self) -> usize {
        self.shared.tasks.len()
    }

    /// Handles produced by this session that are still alive.
    pub fn live_handles(&self) -> usize {
        self.shared.handles.len()
    }

    /// Current value of a session counter; always 0 without `metrics`.
    pub fn counter(&self, name: &str) -> u64 {
        self.shared.counters.borrow().get(name)
    }

    /// Tear the session down. Queued tasks are discarded without running and
    /// every handle still held by host code turns inert.
    pub fn dispose(self) {
        tracing::debug!(
            pending = self.shared.tasks.len(),
            handles = self.shared.handles.len(),
            "disposing script session"
        );
    }
}

fn parent_object<'js>(ctx: &Ctx<'js>, parent: Option<&ScriptValue>) -> Result<Object<'js>> {
    let Some(parent) = parent else {
        return Ok(ctx.globals());
    };
    let value = parent.restore(ctx)?;
    let kind = ScriptKind::of(&value);
    value.into_object().ok_or_else(|| {
        ScriptError::conversion("parent object", format!("expected an object, got {kind}"))
    })
}

fn install_task_hook<'js>(ctx: &Ctx<'js>, link: &SessionLink, name: &str) -> Result<()> {
    let link = link.clone();
    let hook = Function::new(ctx.clone(), move |ctx: Ctx<'js>, task: Function<'js>| {
        if let Ok(shared) = link.upgrade() {
            shared.tasks.push(Persistent::save(&ctx, task));
            tracing::trace!(pending = shared.tasks.len(), "task queued");
        }
    })?;
    ctx.globals().set(name, hook)?;
    Ok(())
}

#[derive(Clone, Copy)]
enum ConsoleLevel {
    Debug,
    Info,
    Warn,
    Error,
}

fn install_console<'js>(ctx: &Ctx<'js>) -> Result<()> {
    let console = Object::new(ctx.clone())?;
    for (name, level) in [
        ("debug", ConsoleLevel::Debug),
        ("log", ConsoleLevel::Info),
        ("info", ConsoleLevel::Info),
        ("warn", ConsoleLevel::Warn),
        ("error", ConsoleLevel::Error),
    ] {
        let function = Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
            let line = render_line(&ctx, args.0);
            match level {
                ConsoleLevel::Debug => tracing::debug!(target: CONSOLE_TARGET, "{line}"),
                ConsoleLevel::Info => tracing::info!(target: CONSOLE_TARGET, "{line}"),
                ConsoleLevel::Warn => tracing::warn!(target: CONSOLE_TARGET, "{line}"),
                ConsoleLevel::Error => tracing::error!(target: CONSOLE_TARGET, "{line}"),
            }
        })?;
        console.set(name, function)?;
    }
    ctx.globals().set("console", console)?;
    Ok(())
}

fn render_line<'js>(ctx: &Ctx<'js>, args: Vec<Value<'js>>) -> String {
    args.into_iter()
        .map(|arg| render_value(ctx, arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_value<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> String {
    match ScriptKind::of(&value) {
        ScriptKind::String => value.get::<String>().unwrap_or_default(),
        ScriptKind::Object | ScriptKind::Array => ctx
            .json_stringify(value.clone())
            .catch(ctx)
            .ok()
            .flatten()
            .and_then(|json| json.to_string().ok())
            .unwrap_or_else(|| coerce(&value)),
        _ => coerce(&value),
    }
}

fn coerce(value: &Value<'_>) -> String {
    value
        .get::<Coerced<String>>()
        .map(|coerced| coerced.0)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bind_methods, bind_statics, ScriptFunction};
    use serde::Deserialize;

    thread_local! {
        static CONSOLE_LINES: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct SimpleClass {
        #[serde(rename = "Title")]
        title: String,
    }

    impl SimpleClass {
        fn say_hi(&mut self) {}

        fn say_hi_with_return(&mut self) -> bool {
            true
        }
    }

    impl HostClass for SimpleClass {
        const NAME: &'static str = "SimpleClass";

        fn methods(methods: &mut Methods<Self>) {
            bind_methods!(methods: say_hi as "SayHi", say_hi_with_return as "SayHiWithReturn");
        }
    }

    #[derive(Default, Serialize)]
    struct Console;

    impl Console {
        fn write_line(text: String, arg: Option<String>) {
            let line = match arg {
                Some(arg) => format!("{text} {arg}"),
                None => text,
            };
            CONSOLE_LINES.with(|lines| lines.borrow_mut().push(line));
        }
    }

    impl HostClass for Console {
        const NAME: &'static str = "Console";

        fn statics(statics: &mut Statics) {
            bind_statics!(statics: write_line as "WriteLine");
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Holder {
        #[serde(rename = "Title")]
        title: String,
    }

    impl HostClass for Holder {
        const NAME: &'static str = "HolderClass";
    }

    #[derive(Default, Serialize)]
    struct AdvancedClass {
        #[serde(skip)]
        titles: Vec<String>,
    }

    impl AdvancedClass {
        fn array_method(&mut self, holders: Vec<Holder>) -> usize {
            self.titles = holders.into_iter().map(|holder| holder.title).collect();
            self.titles.len()
        }

        fn titles(&mut self) -> Vec<String> {
            self.titles.clone()
        }

        fn func_test(&mut self, execute: ScriptFunction<(i32,), i32>) -> i32 {
            execute.call((50,)).unwrap_or(-1)
        }

        fn accept(&mut self, value: Option<String>) -> bool {
            value.is_none()
        }
    }

    impl HostClass for AdvancedClass {
        const NAME: &'static str = "AdvancedClass";

        fn methods(methods: &mut Methods<Self>) {
            bind_methods!(methods:
                array_method as "ArrayMethod",
                titles as "Titles",
                func_test as "FuncTest",
                accept,
            );
        }
    }

    #[derive(Default, Serialize)]
    struct Emitter {
        #[serde(skip)]
        handler: Option<ScriptFunction<(i32,), i32>>,
    }

    impl Emitter {
        fn on(&mut self, handler: Option<ScriptFunction<(i32,), i32>>) -> bool {
            self.handler = handler;
            self.handler.is_some()
        }

        fn emit(&mut self, value: i32) -> i32 {
            match &self.handler {
                Some(handler) => handler.call((value,)).unwrap_or(-1),
                None => value,
            }
        }
    }

    impl HostClass for Emitter {
        const NAME: &'static str = "Emitter";

        fn methods(methods: &mut Methods<Self>) {
            bind_methods!(methods: on, emit);
        }
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum TestEnum {
        Test1,
        Test2,
        Test3,
    }

    #[test]
    fn test_constructed_instance_reflects_script_writes() {
        let session = Session::new().unwrap();
        session.add_type::<SimpleClass>("SimpleClass").unwrap();

        let value = session
            .execute("var i = new SimpleClass();\ni.Title = 'test1234';i;")
            .unwrap();
        let output: SimpleClass = session.decode(&value).unwrap();
        assert_eq!(output.title, "test1234");
    }

    #[test]
    fn test_methods_resolve_to_explicit_names() {
        let session = Session::new().unwrap();
        session.add_type::<SimpleClass>("SimpleClass").unwrap();

        session.execute("var i = new SimpleClass();\ni.SayHi();").unwrap();
        assert!(session.evaluate::<bool>("i.SayHiWithReturn();").unwrap());

        let kinds: Vec<String> = session
            .evaluate("[typeof i.SayHi, typeof i.say_hi, typeof i.say_hi_with_return]")
            .unwrap();
        assert_eq!(kinds, vec!["function", "undefined", "undefined"]);

        // No-value methods surface as undefined
        assert!(session.execute("i.SayHi()").unwrap().is_undefined());
    }

    #[test]
    fn test_static_members_hang_off_the_constructor() {
        let session = Session::new().unwrap();
        session.add_type::<Console>("Console").unwrap();

        session
            .execute("Console.WriteLine('Console Test(JS)', null)")
            .unwrap();
        let lines = CONSOLE_LINES.with(|lines| lines.borrow().clone());
        assert_eq!(lines, vec!["Console Test(JS)".to_string()]);
    }

    #[test]
    fn test_arity_mismatch_fails_the_execution() {
        let session = Session::new().unwrap();
        session.add_type::<Console>("Console").unwrap();

        let err = session.execute("Console.WriteLine('only one')").unwrap_err();
        assert!(err.to_string().contains("'WriteLine' expects 2 argument(s), got 1"), "{err}");
        CONSOLE_LINES.with(|lines| assert!(lines.borrow().is_empty()));

        // The session survives the failed call
        assert_eq!(session.evaluate::<i32>("1 + 1").unwrap(), 2);
    }

    #[test]
    fn test_primitive_globals_round_trip() {
        let session = Session::new().unwrap();
        session.add_object("jsAccessInt", &5).unwrap();
        session.add_object("jsAccessBool", &true).unwrap();
        session.add_object("jsAccessString", "Hello World").unwrap();
        session.add_object("jsAccessDouble", &5.6).unwrap();
        session.add_object("jsAccessEnum", &TestEnum::Test2).unwrap();

        assert_eq!(session.evaluate::<i32>("jsAccessInt;").unwrap(), 5);
        assert!(session.evaluate::<bool>("jsAccessBool;").unwrap());
        assert_eq!(session.evaluate::<String>("jsAccessString;").unwrap(), "Hello World");
        assert_eq!(session.evaluate::<f64>("jsAccessDouble;").unwrap(), 5.6);
        assert_eq!(session.evaluate::<TestEnum>("jsAccessEnum;").unwrap(), TestEnum::Test2);
    }

    #[test]
    fn test_collections_round_trip() {
        let session = Session::new().unwrap();

        let ints = session.encode(&vec![8, 3, 5]).unwrap();
        assert_eq!(session.decode::<Vec<i32>>(&ints).unwrap(), vec![8, 3, 5]);

        let enums = session
            .encode(&[TestEnum::Test3, TestEnum::Test1])
            .unwrap();
        assert_eq!(
            session.decode::<Vec<TestEnum>>(&enums).unwrap(),
            vec![TestEnum::Test3, TestEnum::Test1]
        );

        let doubles = session.encode(&vec![0.5, 1.25]).unwrap();
        assert_eq!(session.decode_value(&doubles).unwrap(), serde_json::json!([0.5, 1.25]));
    }

    #[test]
    fn test_composite_round_trip_keeps_callables() {
        let session = Session::new().unwrap();
        let value = session
            .encode_instance(SimpleClass {
                title: "encoded".to_string(),
            })
            .unwrap();
        let global = session.global_object().unwrap();
        session.add_object_to(&global, "marker", &1).unwrap();

        let decoded: SimpleClass = session.decode(&value).unwrap();
        assert_eq!(decoded.title, "encoded");
        assert_eq!(session.evaluate::<i32>("marker").unwrap(), 1);
    }

    #[test]
    fn test_array_of_constructed_instances() {
        let session = Session::new().unwrap();
        session.add_instance("advancedClass", AdvancedClass::default()).unwrap();
        session.add_type::<Holder>("holder").unwrap();

        session.execute("var holder1 = new holder();").unwrap();
        session.execute("holder1.Title = 'test123';").unwrap();
        session.execute("var holder2 = new holder();").unwrap();
        session.execute("holder2.Title = 'test456';").unwrap();
        session.execute("var holders = [holder1, holder2]").unwrap();

        let count: usize = session.evaluate("advancedClass.ArrayMethod(holders);").unwrap();
        assert_eq!(count, 2);
        let titles: Vec<String> = session.evaluate("advancedClass.Titles()").unwrap();
        assert_eq!(titles, vec!["test123", "test456"]);
    }

    #[test]
    fn test_script_callback_as_host_delegate() {
        let session = Session::new().unwrap();
        session.add_instance("advancedClass2", AdvancedClass::default()).unwrap();

        let result: i32 = session
            .evaluate("advancedClass2.FuncTest(function (i) {\nreturn i + 1;\n});")
            .unwrap();
        assert_eq!(result, 51);
    }

    #[test]
    fn test_reentrant_receiver_is_rejected() {
        let session = Session::new().unwrap();
        session.add_instance("advanced", AdvancedClass::default()).unwrap();

        // The inner call finds the receiver borrowed and throws, so the outer
        // delegate call fails
        let result: i32 = session
            .evaluate("advanced.FuncTest(function (i) { return advanced.FuncTest(function (j) { return j; }); })")
            .unwrap();
        assert_eq!(result, -1);
    }

    #[test]
    fn test_delegate_called_from_host_drains() {
        let session = Session::new().unwrap();
        let double: ScriptFunction<(i32,), i32> = session.evaluate("(x) => x * 2").unwrap();
        assert_eq!(double.call((21,)).unwrap(), 42);

        let schedule: ScriptFunction<(), ()> = session
            .evaluate("() => queueMicrotask(() => { globalThis.flag = true; })")
            .unwrap();
        schedule.call(()).unwrap();
        assert_eq!(session.pending_tasks(), 0);
        assert!(session.evaluate::<bool>("flag").unwrap());

        let failing: ScriptFunction<(), ()> = session
            .evaluate("() => { throw new Error('delegate failed'); }")
            .unwrap();
        let err = failing.call(()).unwrap_err();
        assert!(matches!(err, ScriptError::Execution { ref message, .. } if message == "delegate failed"));
    }

    #[test]
    fn test_task_queue_drains_to_fixpoint_in_order() {
        let session = Session::new().unwrap();
        session
            .execute(
                "var order = [];
                 queueMicrotask(function () {
                     order.push(1);
                     queueMicrotask(function () { order.push(3); });
                 });
                 queueMicrotask(function () { order.push(2); });",
            )
            .unwrap();
        assert_eq!(session.pending_tasks(), 0);
        assert_eq!(session.evaluate::<Vec<i32>>("order").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_tasks_receive_the_global_object() {
        let session = Session::new().unwrap();
        session
            .execute("queueMicrotask(function (g) { g.seen = (g === globalThis); });")
            .unwrap();
        assert!(session.evaluate::<bool>("seen").unwrap());
    }

    #[test]
    fn test_promise_continuations_run_before_return() {
        let session = Session::new().unwrap();
        session
            .execute(
                "var log = [];
                 Promise.resolve(1)
                     .then(v => { log.push(v); return v + 1; })
                     .then(v => { log.push(v); queueMicrotask(() => log.push(3)); });",
            )
            .unwrap();
        assert_eq!(session.evaluate::<Vec<i32>>("log").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_failing_task_does_not_stop_the_drain() {
        let session = Session::new().unwrap();
        session
            .execute(
                "queueMicrotask(() => { throw new Error('bad task'); });
                 queueMicrotask(() => { globalThis.after = true; });",
            )
            .unwrap();
        assert!(session.evaluate::<bool>("after").unwrap());
        assert!(logs_contain("queued task failed"));
    }

    #[test]
    fn test_script_error_carries_message_and_source() {
        let session = Session::new().unwrap();
        session.execute("1").unwrap();

        let err = session.execute("throw new Error('boom')").unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(matches!(err, ScriptError::Execution { source_id: Some(1), .. }));

        let err = session.execute("throw 'boom'").unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_failed_execution_keeps_queued_tasks() {
        let session = Session::new().unwrap();
        let err = session
            .execute("queueMicrotask(() => { globalThis.late = true; }); throw new Error('stop');")
            .unwrap_err();
        assert!(err.to_string().contains("stop"));
        assert_eq!(session.pending_tasks(), 1);

        session.execute("0").unwrap();
        assert_eq!(session.pending_tasks(), 0);
        assert!(session.evaluate::<bool>("late").unwrap());
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_null_argument_skips_json_round_trip() {
        let session = Session::new().unwrap();
        session.add_instance("probe", AdvancedClass::default()).unwrap();

        let before = session.counter("json_round_trips");
        assert!(session.evaluate::<bool>("probe.accept(null)").unwrap());
        assert!(session.evaluate::<bool>("probe.accept(undefined)").unwrap());
        assert_eq!(session.counter("json_round_trips"), before);

        // Numbers take the round trip
        session.evaluate::<Option<i32>>("42").unwrap();
        assert_eq!(session.counter("json_round_trips"), before + 1);
        assert!(session.counter("native_calls") >= 2);
        assert!(session.counter("executions") >= 3);
    }

    #[test]
    fn test_nested_namespaces() {
        let session = Session::new().unwrap();
        let app: ScriptValue = session.evaluate("globalThis.app = {}; app").unwrap();

        session
            .add_object_to(&app, "config", &serde_json::json!({ "debug": true }))
            .unwrap();
        session.add_type_to::<SimpleClass>(&app, "Simple").unwrap();
        session
            .add_instance_to(&app, "holder", Holder { title: "nested".to_string() })
            .unwrap();

        assert!(session.evaluate::<bool>("app.config.debug").unwrap());
        assert!(session.evaluate::<bool>("new app.Simple().SayHiWithReturn()").unwrap());
        assert_eq!(session.evaluate::<String>("app.holder.Title").unwrap(), "nested");

        let number = session.encode(&3).unwrap();
        let err = session.add_object_to(&number, "x", &1).unwrap_err();
        assert!(matches!(err, ScriptError::Conversion { .. }));
    }

    #[test]
    fn test_hook_name_is_configurable() {
        let session = Session::configure(|options| {
            options.task_hook = Some("defer".to_string());
        })
        .unwrap();
        session
            .execute("var ran = false; defer(() => { ran = true; });")
            .unwrap();
        assert!(session.evaluate::<bool>("ran").unwrap());

        let session = Session::configure(|options| options.task_hook = None).unwrap();
        assert_eq!(
            session.evaluate::<String>("typeof defer").unwrap(),
            "undefined"
        );
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_console_forwards_to_tracing() {
        let session = Session::configure(|options| options.console = true).unwrap();
        session
            .execute("console.log('hello', 42, { a: 1 }); console.error('failure');")
            .unwrap();
        assert!(logs_contain("hello 42 {\"a\":1}"));
        assert!(logs_contain("failure"));
    }

    #[test]
    fn test_memory_limit_is_enforced() {
        let session = Session::configure(|options| {
            options.memory_limit = Some(4 * 1024 * 1024);
        })
        .unwrap();
        assert!(session
            .execute("var big = []; for (var i = 0; i < 1e7; i++) { big.push('x' + i); }")
            .is_err());
    }

    #[test]
    fn test_non_finite_floats_reach_script_as_numbers() {
        let session = Session::new().unwrap();
        session.add_object("inf", &f64::INFINITY).unwrap();
        session.add_object("nan", &f64::NAN).unwrap();

        assert_eq!(session.evaluate::<String>("String(inf)").unwrap(), "Infinity");
        assert_eq!(session.evaluate::<String>("String(-inf)").unwrap(), "-Infinity");
        assert!(session.evaluate::<bool>("Number.isNaN(nan)").unwrap());
    }

    #[test]
    fn test_dropped_handles_release_their_reference() {
        let session = Session::new().unwrap();
        let value = session.execute("({ a: 1 })").unwrap();
        let copy = value.clone();
        assert_eq!(session.live_handles(), 2);

        drop(value);
        assert_eq!(session.live_handles(), 1);
        assert_eq!(session.decode_value(&copy).unwrap(), serde_json::json!({ "a": 1 }));

        drop(copy);
        assert_eq!(session.live_handles(), 0);
    }

    #[test]
    fn test_handle_outliving_session_is_inert() {
        let value = {
            let session = Session::new().unwrap();
            session.execute("42").unwrap()
        };
        assert_eq!(value.kind(), &ScriptKind::Number);
        assert!(!value.is_live());
        drop(value);
    }

    #[test]
    fn test_dispose_with_live_handles() {
        let session = Session::new().unwrap();
        let number = session.execute("42").unwrap();
        let object = session.execute("({ nested: [1, 2] })").unwrap();
        let double: ScriptFunction<(i32,), i32> = session.evaluate("(x) => x * 2").unwrap();
        assert_eq!(session.live_handles(), 3);

        session.dispose();

        assert_eq!(number.kind(), &ScriptKind::Number);
        assert!(!object.is_live());
        assert!(!object.clone().is_live());
        assert!(matches!(double.call((1,)), Err(ScriptError::Disposed)));
    }

    #[test]
    fn test_stored_callback_is_released_on_dispose() {
        let session = Session::new().unwrap();
        session.add_instance("emitter", Emitter::default()).unwrap();

        assert!(session
            .evaluate::<bool>("emitter.on(function (x) { return x * 10; })")
            .unwrap());
        assert_eq!(session.evaluate::<i32>("emitter.emit(4)").unwrap(), 40);
        // Only the stored callback is still held
        assert_eq!(session.live_handles(), 1);

        session.dispose();
    }

    #[test]
    fn test_optional_callback_accepts_null() {
        let session = Session::new().unwrap();
        session.add_instance("emitter", Emitter::default()).unwrap();

        assert!(session.evaluate::<bool>("emitter.on((x) => x + 1)").unwrap());
        assert_eq!(session.evaluate::<i32>("emitter.emit(1)").unwrap(), 2);

        // Clearing the callback drops the stored handle
        assert!(!session.evaluate::<bool>("emitter.on(null)").unwrap());
        assert_eq!(session.evaluate::<i32>("emitter.emit(1)").unwrap(), 1);
        assert_eq!(session.live_handles(), 0);
    }

    #[test]
    fn test_dispose_discards_pending_tasks() {
        let session = Session::new().unwrap();
        let _ = session.execute("queueMicrotask(() => {}); throw new Error('halt');");
        assert_eq!(session.pending_tasks(), 1);
        session.dispose();
    }
}
