/*!
 * Dispatch tables and the command registry.
 *
 * Every instrument type declares its command set once through [`Commands`].
 * The set is compiled into a [`DispatchTable`] the first time it is needed and
 * cached per type in a [`CommandRegistry`]. Sub-device routes are expanded at
 * build time, so dispatch is one pass over a flat table.
 */
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use parking_lot::RwLock;
use regex::{RegexSet, RegexSetBuilder};
use tracing::{debug, info};

use crate::error::{Error, Result, SchemaError};
use crate::handler::{Combinator, Handler, Operation, Reply, Route, Signature, SubDevice};
use crate::pattern::CommandPattern;
use crate::types::Value;

/// A type that responds to SCPI commands
pub trait Commands: Send + Sync + Sized + 'static {
    /// Declare every command binding of this type
    fn commands(set: &mut CommandSet<Self>) -> Result<()>;
}

/// Collects the bindings of one instrument type
pub struct CommandSet<D> {
    handlers: Vec<Handler<D>>,
}

impl<D: Send + Sync + 'static> CommandSet<D> {
    fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Bind an abbreviation-expanded template to an operation
    pub fn scpi<M, O>(&mut self, template: &str, op: O) -> Result<&mut Self>
    where
        O: Operation<D, M>,
        O::Output: Reply,
    {
        self.handler(CommandPattern::scpi(template)?, op)
    }

    /// Bind a verbatim regular expression to an operation
    pub fn raw<M, O>(&mut self, pattern: &str, op: O) -> Result<&mut Self>
    where
        O: Operation<D, M>,
        O::Output: Reply,
    {
        self.handler(CommandPattern::raw(pattern)?, op)
    }

    /// Bind an already compiled pattern to an operation
    pub fn handler<M, O>(&mut self, pattern: CommandPattern, op: O) -> Result<&mut Self>
    where
        O: Operation<D, M>,
        O::Output: Reply,
    {
        self.insert(Handler::from_operation(pattern, op)?)
    }

    /// Expose every command of `C` behind an abbreviation-expanded prefix.
    ///
    /// `op` picks the sub-device from the prefix captures.
    pub fn subsystem<C, M, O>(&mut self, template: &str, op: O) -> Result<&mut Self>
    where
        C: Commands,
        O: Operation<D, M>,
        O::Output: SubDevice<C>,
    {
        self.route(CommandPattern::scpi(template)?, op)
    }

    /// Expose every command of `C` behind a compiled prefix pattern
    pub fn route<C, M, O>(&mut self, pattern: CommandPattern, op: O) -> Result<&mut Self>
    where
        C: Commands,
        O: Operation<D, M>,
        O::Output: SubDevice<C>,
    {
        let route: Route<D, C> = Route::from_operation(pattern, op)?;
        let child = DispatchTable::<C>::build()?;
        for handler in child.handlers() {
            self.insert(Combinator::combine(&route, handler)?)?;
        }
        Ok(self)
    }

    /// Add a finished handler
    pub fn insert(&mut self, handler: Handler<D>) -> Result<&mut Self> {
        if self
            .handlers
            .iter()
            .any(|existing| existing.pattern() == handler.pattern())
        {
            return Err(SchemaError::DuplicatePattern(handler.pattern().template().to_string()).into());
        }
        self.handlers.push(handler);
        Ok(self)
    }
}

/// The compiled command set of one instrument type
pub struct DispatchTable<D> {
    handlers: Vec<Handler<D>>,
    matcher: RegexSet,
}

impl<D: Commands> DispatchTable<D> {
    /// Build the table from the type's declared bindings
    pub fn build() -> Result<Self> {
        let mut set = CommandSet::new();
        D::commands(&mut set)?;
        Self::from_handlers(set.handlers)
    }
}

impl<D: Send + Sync + 'static> DispatchTable<D> {
    /// Build a table from finished handlers
    pub fn from_handlers(handlers: Vec<Handler<D>>) -> Result<Self> {
        let matcher = RegexSetBuilder::new(handlers.iter().map(|h| h.pattern().anchored()))
            .case_insensitive(true)
            .build()
            .map_err(|e| SchemaError::InvalidPattern {
                template: type_name::<D>().to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self { handlers, matcher })
    }

    /// Find the single handler matching `command` and its raw arguments
    pub fn lookup(&self, command: &str) -> Result<(&Handler<D>, Vec<String>)> {
        let matches: Vec<usize> = self.matcher.matches(command).into_iter().collect();
        match matches.as_slice() {
            [] => Err(Error::unknown_command(command)),
            [index] => {
                let handler = &self.handlers[*index];
                let args = handler
                    .pattern()
                    .captures(command)
                    .ok_or_else(|| Error::unknown_command(command))?;
                Ok((handler, args))
            }
            several => Err(Error::AmbiguousCommand {
                command: command.to_string(),
                patterns: several
                    .iter()
                    .map(|&i| self.handlers[i].pattern().template().to_string())
                    .collect(),
            }),
        }
    }

    /// Route `command` to its handler and run it on `device`.
    ///
    /// The configured delay is slept on the calling thread before the handler
    /// body runs.
    pub fn dispatch(&self, device: &D, delays: &CallDelays, command: &str) -> Result<Value> {
        let (handler, args) = self.lookup(command)?;

        let delay = delays.delay_for(handler.pattern());
        if !delay.is_zero() {
            debug!(command, delay_ms = delay.as_millis() as u64, "Delaying command");
            thread::sleep(delay);
        }

        let value = handler.invoke(device, &args)?;
        debug!(
            instrument = type_name::<D>(),
            command,
            pattern = handler.pattern().template(),
            reply = %value,
            "Dispatched command"
        );
        Ok(value)
    }

    /// Set the delay of one command on one device instance.
    ///
    /// The pattern must be part of this table.
    pub fn set_command_delay(
        &self,
        delays: &CallDelays,
        pattern: &CommandPattern,
        delay: Duration,
    ) -> Result<()> {
        if self.get(pattern).is_none() {
            return Err(Error::unknown_command(pattern.template()));
        }
        delays.set_command(pattern, delay);
        Ok(())
    }

    /// The handler compiled from `pattern`, if any
    pub fn get(&self, pattern: &CommandPattern) -> Option<&Handler<D>> {
        self.handlers.iter().find(|h| h.pattern() == pattern)
    }

    /// All handlers in declaration order
    pub fn handlers(&self) -> &[Handler<D>] {
        &self.handlers
    }

    /// Template and signature of every handler
    pub fn signatures(&self) -> Vec<(String, Signature)> {
        self.handlers
            .iter()
            .map(|h| (h.pattern().template().to_string(), h.signature().clone()))
            .collect()
    }

    /// Number of handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the table has no handlers
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Call delays of one device instance
#[derive(Debug, Default)]
pub struct CallDelays {
    default: RwLock<Duration>,
    overrides: RwLock<HashMap<String, Duration>>,
}

impl CallDelays {
    /// Delays with the given device default and no overrides
    pub fn new(default: Duration) -> Self {
        Self {
            default: RwLock::new(default),
            overrides: RwLock::new(HashMap::new()),
        }
    }

    /// The device-wide default delay
    pub fn default_delay(&self) -> Duration {
        *self.default.read()
    }

    /// Replace the device-wide default delay
    pub fn set_default(&self, delay: Duration) {
        *self.default.write() = delay;
    }

    /// Override the delay of one command
    pub fn set_command(&self, pattern: &CommandPattern, delay: Duration) {
        self.overrides
            .write()
            .insert(pattern.source().to_string(), delay);
    }

    /// Remove the override of one command
    pub fn clear_command(&self, pattern: &CommandPattern) {
        self.overrides.write().remove(pattern.source());
    }

    /// Override if present, otherwise the default
    pub fn delay_for(&self, pattern: &CommandPattern) -> Duration {
        self.overrides
            .read()
            .get(pattern.source())
            .copied()
            .unwrap_or_else(|| self.default_delay())
    }
}

type AnyTable = Arc<dyn Any + Send + Sync>;

/// Cache of dispatch tables keyed by instrument type
#[derive(Default)]
pub struct CommandRegistry {
    tables: RwLock<HashMap<TypeId, AnyTable>>,
}

static GLOBAL_REGISTRY: OnceLock<CommandRegistry> = OnceLock::new();

impl CommandRegistry {
    /// A private, empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry
    pub fn global() -> &'static CommandRegistry {
        GLOBAL_REGISTRY.get_or_init(CommandRegistry::new)
    }

    /// The table of `D`, built on first request.
    ///
    /// A failed build is not cached, so the error repeats on every request.
    pub fn table<D: Commands>(&self) -> Result<Arc<DispatchTable<D>>> {
        let id = TypeId::of::<D>();
        if let Some(table) = self.tables.read().get(&id) {
            return downcast(table.clone());
        }

        let built = Arc::new(DispatchTable::<D>::build()?);
        info!(
            instrument = type_name::<D>(),
            commands = built.len(),
            "Built dispatch table"
        );

        let mut tables = self.tables.write();
        let table = tables.entry(id).or_insert_with(|| built as AnyTable);
        downcast(table.clone())
    }

    /// Route `command` through the table of `D`
    pub fn dispatch<D: Commands>(&self, device: &D, delays: &CallDelays, command: &str) -> Result<Value> {
        self.table::<D>()?.dispatch(device, delays, command)
    }

    /// Template and signature of every command of `D`
    pub fn commands<D: Commands>(&self) -> Result<Vec<(String, Signature)>> {
        Ok(self.table::<D>()?.signatures())
    }

    /// Whether the table of `D` has been built
    pub fn contains<D: Commands>(&self) -> bool {
        self.tables.read().contains_key(&TypeId::of::<D>())
    }

    /// Number of cached tables
    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    /// Whether no table has been built yet
    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }

    /// Drop every cached table
    pub fn clear(&self) {
        self.tables.write().clear();
    }
}

fn downcast<D: Commands>(table: AnyTable) -> Result<Arc<DispatchTable<D>>> {
    table
        .downcast::<DispatchTable<D>>()
        .map_err(|_| Error::runtime(format!("dispatch table of {} has the wrong type", type_name::<D>())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Instant;

    struct Mocker {
        voltage: Mutex<f64>,
    }

    impl Mocker {
        fn new() -> Self {
            Self {
                voltage: Mutex::new(0.0),
            }
        }

        fn idn(&self) -> &'static str {
            "Mocker,testing,00000,0.01"
        }

        fn set_voltage(&self, volts: f64) {
            *self.voltage.lock() = volts;
        }

        fn get_voltage(&self) -> f64 {
            *self.voltage.lock()
        }
    }

    impl Commands for Mocker {
        fn commands(set: &mut CommandSet<Self>) -> Result<()> {
            set.scpi("\\*IDN\\?", Self::idn)?
                .scpi(":VOLTage (.*)", Self::set_voltage)?
                .scpi(":VOLTage\\?", Self::get_voltage)?;
            Ok(())
        }
    }

    struct Clashing;

    impl Commands for Clashing {
        fn commands(set: &mut CommandSet<Self>) -> Result<()> {
            set.scpi(":PASSfail", |_: &Self| "scpi")?
                .raw(":pass(?-i:FAIL)", |_: &Self| "raw")?;
            Ok(())
        }
    }

    struct Duplicated;

    impl Commands for Duplicated {
        fn commands(set: &mut CommandSet<Self>) -> Result<()> {
            set.scpi(":VOLTage\\?", |_: &Self| 1.0)?
                .raw(":VOLT(?:age)?\\?", |_: &Self| 2.0)?;
            Ok(())
        }
    }

    #[test]
    fn test_dispatch_round_trip() {
        let table = DispatchTable::<Mocker>::build().unwrap();
        let device = Mocker::new();
        let delays = CallDelays::default();

        assert_eq!(
            table.dispatch(&device, &delays, "*IDN?").unwrap(),
            Value::from("Mocker,testing,00000,0.01")
        );
        assert_eq!(table.dispatch(&device, &delays, ":VOLT 12").unwrap(), Value::Null);
        assert_eq!(
            table.dispatch(&device, &delays, ":voltage?").unwrap().to_string(),
            "12.0"
        );
    }

    #[test]
    fn test_unknown_command() {
        let table = DispatchTable::<Mocker>::build().unwrap();
        let err = table
            .dispatch(&Mocker::new(), &CallDelays::default(), ":CURRent?")
            .unwrap_err();
        assert!(matches!(err, Error::UnknownCommand(cmd) if cmd == ":CURRent?"));
    }

    #[test]
    fn test_ambiguous_command() {
        let table = DispatchTable::<Clashing>::build().unwrap();
        let delays = CallDelays::default();

        match table.dispatch(&Clashing, &delays, ":passFAIL") {
            Err(Error::AmbiguousCommand { patterns, .. }) => {
                assert_eq!(patterns, vec![":PASSfail", ":pass(?-i:FAIL)"]);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
        assert_eq!(
            table.dispatch(&Clashing, &delays, ":passfail").unwrap(),
            Value::from("scpi")
        );
    }

    #[test]
    fn test_duplicate_pattern_rejected() {
        let err = DispatchTable::<Duplicated>::build().err().unwrap();
        assert!(err.is_schema());
    }

    #[test]
    fn test_command_delay_overrides_default() {
        let table = DispatchTable::<Mocker>::build().unwrap();
        let device = Mocker::new();
        let delays = CallDelays::new(Duration::from_millis(5));
        let slow = CommandPattern::scpi(":VOLTage\\?").unwrap();
        table
            .set_command_delay(&delays, &slow, Duration::from_millis(60))
            .unwrap();

        let start = Instant::now();
        table.dispatch(&device, &delays, ":VOLT?").unwrap();
        assert!(start.elapsed() >= Duration::from_millis(60));

        assert_eq!(delays.delay_for(&CommandPattern::scpi(":VOLTage (.*)").unwrap()), Duration::from_millis(5));

        let missing = CommandPattern::scpi(":CURRent\\?").unwrap();
        assert!(table
            .set_command_delay(&delays, &missing, Duration::from_millis(1))
            .is_err());
    }

    #[test]
    fn test_registry_caches_tables() {
        let registry = CommandRegistry::new();
        assert!(registry.is_empty());

        let first = registry.table::<Mocker>().unwrap();
        let second = registry.table::<Mocker>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.contains::<Mocker>());

        let commands = registry.commands::<Mocker>().unwrap();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[1].0, ":VOLTage (.*)");

        registry.clear();
        assert!(!registry.contains::<Mocker>());
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        let registry = CommandRegistry::new();
        assert!(registry.table::<Duplicated>().is_err());
        assert!(!registry.contains::<Duplicated>());
        assert!(registry.table::<Duplicated>().is_err());
    }
}
