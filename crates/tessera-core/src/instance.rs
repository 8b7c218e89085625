//! Engine instances and the two-level locking model.
//!
//! Each instance owns its patch, receivers, clock, arrays and the producer halves of
//! its event queues, all behind one mutex. Locking an instance also takes a read guard
//! on the global class registry, so any number of instances can run at once while
//! class registration (a writer) waits for all of them.
//!
//! Lock order is always instance mutex, then registry. Release is the reverse. The
//! consumer halves and hooks live behind a separate mutex so a host thread draining
//! events never contends with the audio thread.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::{Mutex, MutexGuard, RwLockReadGuard};
use smallvec::SmallVec;
use tessera_midi::MidiMessage;
use tracing::{debug, trace, warn};

use crate::array::Arrays;
use crate::atom::{Atom, Message, Symbol};
use crate::config::{EngineConfig, BLOCK_SIZE};
use crate::hooks::HookTable;
use crate::patch::{Outlet, Patch, PendingMessages};
use crate::queue::{
    event_queues, ControlEventConsumer, ControlEventProducer, DropCounter, MidiEventConsumer,
    MidiEventProducer,
};
use crate::registry::{registry, Class, ClassRegistry, MethodContext, INLET_CLASS, RECEIVER_CLASS};
use crate::scheduler::Scheduler;
use crate::{Error, Result};

thread_local! {
    static CURRENT: RefCell<Option<Instance>> = const { RefCell::new(None) };
    static HOLDS_LOCK: Cell<bool> = const { Cell::new(false) };
    // Ids of the instances whose drain lock this thread holds.
    static DRAINING: RefCell<SmallVec<[usize; 2]>> = RefCell::new(SmallVec::new());
}

static INSTANCES: Mutex<Vec<Instance>> = parking_lot::const_mutex(Vec::new());
static MAIN: OnceLock<Instance> = OnceLock::new();
static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// Whether the calling thread currently holds an instance lock.
pub fn holds_instance_lock() -> bool {
    HOLDS_LOCK.with(Cell::get)
}

/// Handle to a receiver created with [`Instance::bind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReceiverHandle {
    id: u64,
    name: Symbol,
}

impl ReceiverHandle {
    pub fn name(&self) -> Symbol {
        self.name
    }
}

#[derive(Clone, Copy, Debug)]
struct Binding {
    id: u64,
    class: Symbol,
}

/// Everything bound to one name. The text is resolved at bind time so dispatch
/// never touches the interner.
struct Bound {
    name: &'static str,
    bindings: SmallVec<[Binding; 2]>,
}

#[derive(Default)]
struct Receivers {
    by_name: HashMap<Symbol, Bound>,
    next_id: u64,
}

impl Receivers {
    fn bind(&mut self, name: Symbol, class: Symbol) -> ReceiverHandle {
        self.next_id += 1;
        let id = self.next_id;
        self.by_name
            .entry(name)
            .or_insert_with(|| Bound {
                name: name.as_str(),
                bindings: SmallVec::new(),
            })
            .bindings
            .push(Binding { id, class });
        ReceiverHandle { id, name }
    }

    fn unbind(&mut self, handle: ReceiverHandle) -> bool {
        let Some(bound) = self.by_name.get_mut(&handle.name) else {
            return false;
        };
        let before = bound.bindings.len();
        bound.bindings.retain(|r| r.id != handle.id);
        let removed = bound.bindings.len() != before;
        if bound.bindings.is_empty() {
            self.by_name.remove(&handle.name);
        }
        removed
    }

    fn get(&self, name: Symbol) -> Option<&Bound> {
        self.by_name.get(&name)
    }

    fn clear(&mut self) {
        self.by_name.clear();
    }
}

/// Audio buffers in the engine's internal planar layout.
pub(crate) struct AudioBuffers {
    pub input: Vec<f32>,
    pub output: Vec<f32>,
}

impl AudioBuffers {
    pub fn new(input_channels: usize, output_channels: usize) -> Self {
        Self {
            input: vec![0.0; input_channels * BLOCK_SIZE],
            output: vec![0.0; output_channels * BLOCK_SIZE],
        }
    }
}

/// Everything owned by whichever thread holds the instance lock.
pub(crate) struct EngineState {
    pub config: EngineConfig,
    pub patch: Option<Box<dyn Patch>>,
    receivers: Receivers,
    patch_inlets: Vec<ReceiverHandle>,
    pub control: ControlEventProducer,
    pub midi: MidiEventProducer,
    pub pending: PendingMessages,
    pub scheduler: Scheduler,
    pub arrays: Arrays,
    pub audio: AudioBuffers,
    pub verbose: bool,
    mailbox: Receiver<(Symbol, Message)>,
}

struct DrainState {
    hooks: HookTable,
    control: ControlEventConsumer,
    midi: MidiEventConsumer,
}

struct InstanceInner {
    id: usize,
    freed: AtomicBool,
    state: Mutex<EngineState>,
    drain: Mutex<DrainState>,
    control_drops: Arc<DropCounter>,
    midi_drops: Arc<DropCounter>,
    mailbox: Sender<(Symbol, Message)>,
    // Mirrors of the configured channel counts, readable without the lock.
    input_channels: AtomicUsize,
    output_channels: AtomicUsize,
}

/// Handle to an engine instance. Clones refer to the same instance.
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.inner.id)
            .field("freed", &self.is_freed())
            .finish()
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Instance {}

/// Sets up the engine. The first call creates the main instance with the default
/// configuration. Returns whether this call did the work.
pub fn init() -> Result<bool> {
    static INIT: Mutex<()> = parking_lot::const_mutex(());
    let _once = INIT.lock();
    if MAIN.get().is_some() {
        return Ok(false);
    }
    let main = new_instance(EngineConfig::default())?;
    let _ = MAIN.set(main);
    debug!("engine initialized");
    Ok(true)
}

/// Creates an instance and adds it to the live list. Takes no engine lock.
pub fn new_instance(config: EngineConfig) -> Result<Instance> {
    config.validate()?;
    // Make sure the built-in classes exist before anything can bind.
    drop(registry().read());

    let queues = event_queues(config.queue_capacity)?;
    let (mailbox_tx, mailbox_rx) = crossbeam_channel::bounded(config.max_pending_messages);
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let (input_channels, output_channels) = (config.input_channels, config.output_channels);
    let control_drops = queues.control_consumer.drop_counter();
    let midi_drops = queues.midi_consumer.drop_counter();

    let state = EngineState {
        audio: AudioBuffers::new(config.input_channels, config.output_channels),
        pending: PendingMessages::new(config.max_pending_messages),
        scheduler: Scheduler::new(config.max_pending_messages),
        patch: None,
        receivers: Receivers::default(),
        patch_inlets: Vec::new(),
        control: queues.control_producer,
        midi: queues.midi_producer,
        arrays: Arrays::default(),
        verbose: false,
        mailbox: mailbox_rx,
        config,
    };
    let instance = Instance {
        inner: Arc::new(InstanceInner {
            id,
            freed: AtomicBool::new(false),
            state: Mutex::new(state),
            drain: Mutex::new(DrainState {
                hooks: HookTable::new(),
                control: queues.control_consumer,
                midi: queues.midi_consumer,
            }),
            control_drops,
            midi_drops,
            mailbox: mailbox_tx,
            input_channels: AtomicUsize::new(input_channels),
            output_channels: AtomicUsize::new(output_channels),
        }),
    };
    INSTANCES.lock().push(instance.clone());
    debug!(id, "instance created");
    Ok(instance)
}

/// Frees `instance`: drops its patch, receivers and arrays and discards queued events.
///
/// Fails with [`Error::InstanceBusy`] if another thread is inside the instance, and
/// with [`Error::InstanceFreed`] if it was already freed.
pub fn free_instance(instance: &Instance) -> Result<()> {
    let inner = &instance.inner;
    if inner.freed.load(Ordering::Acquire) {
        return Err(Error::InstanceFreed);
    }
    let mut state = inner.state.try_lock().ok_or(Error::InstanceBusy)?;
    let mut drain = inner.drain.try_lock().ok_or(Error::InstanceBusy)?;
    if inner.freed.swap(true, Ordering::AcqRel) {
        return Err(Error::InstanceFreed);
    }

    let state = &mut *state;
    let drain = &mut *drain;
    state.patch = None;
    state.patch_inlets.clear();
    state.receivers.clear();
    state.arrays.clear();
    state.pending.clear();
    state.scheduler.clear();
    while state.mailbox.try_recv().is_ok() {}
    state.control.clear(&mut drain.control);
    state.midi.clear(&mut drain.midi);
    drain.hooks.clear();

    INSTANCES.lock().retain(|i| i != instance);
    CURRENT.with(|current| {
        let mut current = current.borrow_mut();
        if current.as_ref() == Some(instance) {
            *current = None;
        }
    });
    debug!(id = inner.id, "instance freed");
    Ok(())
}

/// Binds the calling thread to `instance`. Free functions that act on "the current
/// instance" use it until the thread exits or another instance is set.
pub fn set_current_instance(instance: &Instance) {
    CURRENT.with(|current| *current.borrow_mut() = Some(instance.clone()));
}

/// The instance the calling thread was bound to with [`set_current_instance`].
pub fn this_instance() -> Option<Instance> {
    CURRENT.with(|current| current.borrow().clone())
}

/// The thread's bound instance, or the main instance if none was set.
pub fn current_instance() -> Option<Instance> {
    this_instance().or_else(main_instance)
}

/// The instance created by [`init`].
pub fn main_instance() -> Option<Instance> {
    MAIN.get().cloned()
}

/// The `index`-th live instance, in creation order.
pub fn get_instance(index: usize) -> Option<Instance> {
    INSTANCES.lock().get(index).cloned()
}

pub fn num_instances() -> usize {
    INSTANCES.lock().len()
}

/// Exclusive access to an instance.
///
/// Holds the instance mutex and a read guard on the class registry. Field order
/// matters: the registry guard is released before the instance mutex.
pub struct InstanceGuard<'a> {
    registry: RwLockReadGuard<'static, ClassRegistry>,
    state: MutexGuard<'a, EngineState>,
    instance: &'a Instance,
}

impl Drop for InstanceGuard<'_> {
    fn drop(&mut self) {
        HOLDS_LOCK.with(|flag| flag.set(false));
    }
}

/// The drain mutex, marked as held by the calling thread until dropped.
struct DrainGuard<'a> {
    drain: MutexGuard<'a, DrainState>,
    id: usize,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        DRAINING.with(|ids| {
            let mut ids = ids.borrow_mut();
            if let Some(pos) = ids.iter().rposition(|&id| id == self.id) {
                ids.remove(pos);
            }
        });
    }
}

impl Instance {
    pub fn id(&self) -> usize {
        self.inner.id
    }

    pub fn is_freed(&self) -> bool {
        self.inner.freed.load(Ordering::Acquire)
    }

    /// Locks the instance mutex, then takes the registry read guard.
    ///
    /// Instance locks do not nest: a thread must release one before taking another.
    pub fn lock(&self) -> Result<InstanceGuard<'_>> {
        debug_assert!(
            !holds_instance_lock(),
            "instance locks must not be nested on one thread"
        );
        if self.is_freed() {
            return Err(Error::InstanceFreed);
        }
        let state = self.inner.state.lock();
        if self.is_freed() {
            return Err(Error::InstanceFreed);
        }
        let registry = registry().read();
        HOLDS_LOCK.with(|flag| flag.set(true));
        Ok(InstanceGuard {
            registry,
            state,
            instance: self,
        })
    }

    pub fn make_current(&self) {
        set_current_instance(self);
    }

    pub fn config(&self) -> Result<EngineConfig> {
        Ok(self.lock()?.state.config.clone())
    }

    /// Loads `patch`, replacing any previous one, and binds its inlets.
    pub fn load_patch(&self, patch: Box<dyn Patch>) -> Result<()> {
        self.lock()?.load_patch(patch);
        Ok(())
    }

    /// Drops the loaded patch and unbinds its inlets.
    pub fn close_patch(&self) -> Result<()> {
        self.lock()?.close_patch();
        Ok(())
    }

    /// Creates a receiver for `name` whose messages are forwarded to the host's
    /// control hooks. Several receivers may share a name.
    pub fn bind(&self, name: &str) -> Result<ReceiverHandle> {
        self.bind_class(name, RECEIVER_CLASS)
    }

    /// Creates a receiver of a registered class.
    pub fn bind_class(&self, name: &str, class: &str) -> Result<ReceiverHandle> {
        let name = Symbol::new(name);
        let class = Symbol::new(class);
        let mut guard = self.lock()?;
        if guard.registry.get(class).is_none() {
            return Err(Error::UnknownClass(class.to_string()));
        }
        let handle = guard.state.receivers.bind(name, class);
        debug!(instance = self.id(), name = %name, class = %class, "receiver bound");
        Ok(handle)
    }

    /// Removes a receiver. Returns `false` if it was already gone.
    pub fn unbind(&self, handle: ReceiverHandle) -> Result<bool> {
        let removed = self.lock()?.state.receivers.unbind(handle);
        debug!(instance = self.id(), name = %handle.name, removed, "receiver unbound");
        Ok(removed)
    }

    /// Whether anything is bound to `name`.
    pub fn exists(&self, name: &str) -> Result<bool> {
        let Some(name) = Symbol::lookup(name) else {
            return Ok(false);
        };
        Ok(self.lock()?.state.receivers.get(name).is_some())
    }

    /// Delivers `message` to every receiver bound to `name`, then runs whatever
    /// the receivers sent in turn.
    pub fn send(&self, name: &str, message: Message) -> Result<()> {
        let name = Symbol::new(name);
        self.lock()?.send(name, &message)
    }

    pub fn send_bang(&self, name: &str) -> Result<()> {
        self.send(name, Message::Bang)
    }

    pub fn send_float(&self, name: &str, value: f32) -> Result<()> {
        self.send(name, Message::Float(value))
    }

    pub fn send_symbol(&self, name: &str, symbol: &str) -> Result<()> {
        self.send(name, Message::Symbol(Symbol::new(symbol)))
    }

    pub fn send_list(&self, name: &str, atoms: &[Atom]) -> Result<()> {
        self.send(name, Message::List(atoms.iter().copied().collect()))
    }

    pub fn send_message(&self, name: &str, selector: &str, atoms: &[Atom]) -> Result<()> {
        self.send(
            name,
            Message::Typed {
                selector: Symbol::new(selector),
                args: atoms.iter().copied().collect(),
            },
        )
    }

    /// Queues `message` for delivery at the start of the next processing call,
    /// without taking the instance lock. Returns `false` if the mailbox is full.
    pub fn post(&self, name: &str, message: Message) -> Result<bool> {
        if self.is_freed() {
            return Err(Error::InstanceFreed);
        }
        match self.inner.mailbox.try_send((Symbol::new(name), message)) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => Err(Error::InstanceFreed),
        }
    }

    /// Forwards validated MIDI input to the patch.
    pub fn midi_in(&self, message: MidiMessage) -> Result<()> {
        self.lock()?.midi_in(message);
        Ok(())
    }

    pub fn note_on(&self, channel: i32, pitch: i32, velocity: i32) -> Result<()> {
        self.midi_in(MidiMessage::note_on(channel, pitch, velocity)?)
    }

    pub fn control_change(&self, channel: i32, controller: i32, value: i32) -> Result<()> {
        self.midi_in(MidiMessage::control_change(channel, controller, value)?)
    }

    pub fn program_change(&self, channel: i32, program: i32) -> Result<()> {
        self.midi_in(MidiMessage::program_change(channel, program)?)
    }

    /// `value` is signed, `-8192..=8191`.
    pub fn pitch_bend(&self, channel: i32, value: i32) -> Result<()> {
        self.midi_in(MidiMessage::pitch_bend(channel, value)?)
    }

    pub fn after_touch(&self, channel: i32, value: i32) -> Result<()> {
        self.midi_in(MidiMessage::after_touch(channel, value)?)
    }

    pub fn poly_after_touch(&self, channel: i32, pitch: i32, value: i32) -> Result<()> {
        self.midi_in(MidiMessage::poly_after_touch(channel, pitch, value)?)
    }

    pub fn midi_byte(&self, port: i32, byte: i32) -> Result<()> {
        self.midi_in(MidiMessage::byte(port, byte)?)
    }

    pub fn sysex(&self, port: i32, byte: i32) -> Result<()> {
        self.midi_in(MidiMessage::sysex(port, byte)?)
    }

    pub fn sys_realtime(&self, port: i32, byte: i32) -> Result<()> {
        self.midi_in(MidiMessage::sys_realtime(port, byte)?)
    }

    /// Takes the drain mutex. Fails with [`Error::InstanceBusy`] when called from a
    /// hook this instance is running, which would otherwise deadlock.
    fn lock_drain(&self) -> Result<DrainGuard<'_>> {
        if self.is_freed() {
            return Err(Error::InstanceFreed);
        }
        let id = self.inner.id;
        if DRAINING.with(|ids| ids.borrow().contains(&id)) {
            warn!(instance = id, "drain re-entered from a hook");
            return Err(Error::InstanceBusy);
        }
        let drain = self.inner.drain.lock();
        DRAINING.with(|ids| ids.borrow_mut().push(id));
        Ok(DrainGuard { drain, id })
    }

    /// Runs `f` on the hook table.
    ///
    /// Waits for any drain in progress on another thread. Hooks are never touched by
    /// processing, so this does not contend with the audio thread. Hooks of this
    /// instance calling it get [`Error::InstanceBusy`].
    pub fn with_hooks<R>(&self, f: impl FnOnce(&mut HookTable) -> R) -> Result<R> {
        let mut guard = self.lock_drain()?;
        Ok(f(&mut guard.drain.hooks))
    }

    /// Replaces the whole hook table.
    pub fn set_hooks(&self, hooks: HookTable) -> Result<()> {
        self.with_hooks(|table| *table = hooks)?;
        debug!(instance = self.id(), "hooks replaced");
        Ok(())
    }

    /// Dispatches queued control events (print and messages) to the hooks.
    /// Returns the number of events drained.
    ///
    /// Hooks run on the calling thread. A hook may send to the instance or read the
    /// drop counters, but draining this instance again or touching its hook table
    /// from inside a hook fails with [`Error::InstanceBusy`].
    pub fn drain_control_events(&self) -> Result<usize> {
        let mut guard = self.lock_drain()?;
        let drain = &mut *guard.drain;
        Ok(drain.control.drain(&mut drain.hooks))
    }

    /// Dispatches queued MIDI output events to the hooks. Same re-entry rules as
    /// [`drain_control_events`](Self::drain_control_events).
    pub fn drain_midi_events(&self) -> Result<usize> {
        let mut guard = self.lock_drain()?;
        let drain = &mut *guard.drain;
        Ok(drain.midi.drain(&mut drain.hooks))
    }

    /// Control events dropped because the queue was full, since creation. Takes no lock.
    pub fn dropped_control_events(&self) -> usize {
        self.inner.control_drops.get()
    }

    pub fn dropped_midi_events(&self) -> usize {
        self.inner.midi_drops.get()
    }

    pub fn create_array(&self, name: &str, size: usize) -> Result<()> {
        self.lock()?.state.arrays.create(Symbol::new(name), size);
        Ok(())
    }

    pub fn array_size(&self, name: &str) -> Result<usize> {
        let name = Symbol::lookup(name).ok_or_else(|| Error::UnknownArray(name.into()))?;
        self.lock()?.state.arrays.size(name)
    }

    pub fn resize_array(&self, name: &str, size: usize) -> Result<()> {
        let name = Symbol::lookup(name).ok_or_else(|| Error::UnknownArray(name.into()))?;
        self.lock()?.state.arrays.resize(name, size)
    }

    /// Copies `dest.len()` samples starting at `offset` out of array `name`.
    pub fn read_array(&self, dest: &mut [f32], name: &str, offset: usize) -> Result<()> {
        let name = Symbol::lookup(name).ok_or_else(|| Error::UnknownArray(name.into()))?;
        self.lock()?.state.arrays.read(dest, name, offset)
    }

    pub fn write_array(&self, name: &str, offset: usize, src: &[f32]) -> Result<()> {
        let name = Symbol::lookup(name).ok_or_else(|| Error::UnknownArray(name.into()))?;
        self.lock()?.state.arrays.write(name, offset, src)
    }

    /// Prints dispatch diagnostics (unknown receivers, missing methods) to the print hook.
    ///
    /// Diagnostics are formatted on the thread holding the lock, so verbose mode
    /// allocates during processing. Leave it off on the audio thread.
    pub fn set_verbose(&self, verbose: bool) -> Result<()> {
        self.lock()?.state.verbose = verbose;
        Ok(())
    }

    pub fn verbose(&self) -> Result<bool> {
        Ok(self.lock()?.state.verbose)
    }

    /// Logical time in ticks.
    pub fn ticks(&self) -> Result<u64> {
        Ok(self.lock()?.state.scheduler.ticks())
    }

    /// Channel counts as last configured. May be stale while `init_audio` runs.
    pub(crate) fn channels(&self) -> (usize, usize) {
        (
            self.inner.input_channels.load(Ordering::Acquire),
            self.inner.output_channels.load(Ordering::Acquire),
        )
    }

    pub(crate) fn publish_channels(&self, input: usize, output: usize) {
        self.inner.input_channels.store(input, Ordering::Release);
        self.inner.output_channels.store(output, Ordering::Release);
    }
}

impl InstanceGuard<'_> {
    pub fn instance(&self) -> &Instance {
        self.instance
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    /// Runs `f` with write access to the class registry.
    ///
    /// The read guard is released, the write lock taken, and the read guard taken
    /// again after `f` returns. This is not an atomic upgrade: another writer can
    /// get in between, so registry changes belong to setup, not to processing.
    pub fn global_upgrade<R>(&mut self, f: impl FnOnce(&mut ClassRegistry) -> R) -> R {
        debug_assert!(
            holds_instance_lock(),
            "registry writes need an instance lock"
        );
        RwLockReadGuard::unlocked(&mut self.registry, || f(&mut registry().write()))
    }

    /// Adds a class that receivers can be bound to.
    pub fn register_class(&mut self, class: Class) {
        self.global_upgrade(|registry| {
            registry.insert(class);
        });
    }

    pub fn load_patch(&mut self, patch: Box<dyn Patch>) {
        self.close_patch();
        let inlet = Symbol::new(INLET_CLASS);
        let names = patch.inlets();
        let state = &mut *self.state;
        for name in &names {
            let handle = state.receivers.bind(Symbol::new(name), inlet);
            state.patch_inlets.push(handle);
        }
        state.patch = Some(patch);
        debug!(instance = self.instance.id(), inlets = names.len(), "patch loaded");
    }

    pub fn close_patch(&mut self) {
        let state = &mut *self.state;
        for handle in state.patch_inlets.drain(..) {
            state.receivers.unbind(handle);
        }
        if state.patch.take().is_some() {
            debug!(instance = self.instance.id(), "patch closed");
        }
    }

    /// Dispatches `message` to `name` and everything it triggers.
    ///
    /// Fails without side effects if nothing is bound to `name`.
    pub fn send(&mut self, name: Symbol, message: &Message) -> Result<()> {
        if self.state.receivers.get(name).is_none() {
            return Err(Error::UnknownReceiver(name.to_string()));
        }
        dispatch(&self.registry, &mut self.state, name, message);
        flush_pending(&self.registry, &mut self.state);
        Ok(())
    }

    pub fn midi_in(&mut self, message: MidiMessage) {
        let state = &mut *self.state;
        if let Some(patch) = state.patch.as_mut() {
            let mut outlet = Outlet {
                control: &mut state.control,
                midi: &mut state.midi,
                pending: &mut state.pending,
                scheduler: &mut state.scheduler,
            };
            patch.midi_in(message, &mut outlet);
        }
        flush_pending(&self.registry, &mut self.state);
    }

    pub(crate) fn parts(&mut self) -> (&ClassRegistry, &mut EngineState) {
        (&*self.registry, &mut *self.state)
    }
}

/// Runs the method of each receiver bound to `name`.
pub(crate) fn dispatch(
    registry: &ClassRegistry,
    state: &mut EngineState,
    name: Symbol,
    message: &Message,
) -> bool {
    let Some(bound) = state.receivers.get(name) else {
        if state.verbose {
            state.control.print(&format!("{name}: no such object\n"));
        }
        return false;
    };
    let receiver_name = bound.name;
    let receivers = bound.bindings.clone();
    let selector = message.selector();

    for receiver in receivers {
        let Some(method) = registry.get(receiver.class).and_then(|c| c.method(selector)) else {
            trace!(name = %name, selector = %selector, "no method");
            if state.verbose {
                state.control.print(&format!(
                    "{}: no method for '{selector}'\n",
                    receiver.class
                ));
            }
            continue;
        };
        let mut ctx = MethodContext {
            receiver: name,
            receiver_name,
            patch: &mut state.patch,
            outlet: Outlet {
                control: &mut state.control,
                midi: &mut state.midi,
                pending: &mut state.pending,
                scheduler: &mut state.scheduler,
            },
        };
        method(&mut ctx, message);
    }
    true
}

/// Dispatches messages sent from inside methods and patches, in send order.
pub(crate) fn flush_pending(registry: &ClassRegistry, state: &mut EngineState) {
    let mut budget = state.config.max_pending_messages;
    while let Some((name, message)) = state.pending.pop() {
        if budget == 0 {
            // A feedback loop between receivers. Drop the rest.
            state.pending.clear();
            warn!(name = %name, "message loop cut short");
            break;
        }
        budget -= 1;
        dispatch(registry, state, name, &message);
    }
    let dropped = state.pending.take_dropped();
    if dropped > 0 && state.verbose {
        state
            .control
            .print(&format!("{dropped} messages dropped: pending queue full\n"));
    }
}

/// Delivers posted messages, at most `max_pending_messages` per call.
pub(crate) fn poll_mailbox(registry: &ClassRegistry, state: &mut EngineState) {
    for _ in 0..state.config.max_pending_messages {
        let Ok((name, message)) = state.mailbox.try_recv() else {
            break;
        };
        dispatch(registry, state, name, &message);
        flush_pending(registry, state);
    }
}
