//! Test doubles for the kernel's collaborators.
//!
//! Processes run on real std threads; the console, file system and loader
//! are in-memory.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::panic;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, Thread};

use crate::drivers::{Console, PowerControl};
use crate::fs::{File, FileSystem};
use crate::kernel::{Kernel, KernelServices};
use crate::mm::{AddressSpace, MappingError, PageFlags, PagedMemory, VirtAddr, PAGE_SIZE, USER_TOP};
use crate::process::loader::{Image, Loader};
use crate::process::process_name;
use crate::sync::Parker;
use crate::thread::{SpawnError, ThreadBody, Threads};
use crate::trap::{Flow, TrapFrame, UserContext};

/// Parks a std thread.
pub struct ThreadParker(Thread);

impl ThreadParker {
    pub fn current() -> Arc<dyn Parker> {
        Arc::new(Self(thread::current()))
    }
}

impl Parker for ThreadParker {
    fn park(&self) {
        thread::park();
    }

    fn unpark(&self) {
        self.0.unpark();
    }
}

/// Spawns processes on std threads and remembers them for joining.
#[derive(Default)]
pub struct StdThreads {
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
    refuse: AtomicBool,
}

impl StdThreads {
    /// Make every later spawn fail.
    pub fn refuse_spawns(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    /// Join the first still-running thread called `name`.
    pub fn join(&self, name: &str) {
        let handle = {
            let mut handles = self.handles.lock().unwrap();
            let index = handles.iter().position(|(n, _)| n == name);
            index.map(|i| handles.remove(i).1)
        };
        if let Some(handle) = handle {
            if let Err(payload) = handle.join() {
                panic::resume_unwind(payload);
            }
        }
    }

    /// Join every thread, including ones spawned while joining.
    pub fn join_all(&self) {
        loop {
            let next = self.handles.lock().unwrap().pop();
            match next {
                Some((_, handle)) => {
                    if let Err(payload) = handle.join() {
                        panic::resume_unwind(payload);
                    }
                }
                None => break,
            }
        }
    }
}

impl Threads for StdThreads {
    fn spawn(&self, name: &str, body: ThreadBody) -> Result<(), SpawnError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SpawnError::TooManyThreads);
        }
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || body(ThreadParker::current()))
            .map_err(|_| SpawnError::OutOfMemory)?;
        self.handles.lock().unwrap().push((name.to_owned(), handle));
        Ok(())
    }
}

/// Console that records output and replays canned input.
#[derive(Default)]
pub struct MemConsole {
    output: Mutex<Vec<u8>>,
    input: Mutex<VecDeque<u8>>,
    writes: AtomicUsize,
}

impl MemConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&self, bytes: &[u8]) {
        self.input.lock().unwrap().extend(bytes);
    }

    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.output.lock().unwrap()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.output().lines().map(str::to_owned).collect()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Console for MemConsole {
    fn put_bytes(&self, bytes: &[u8]) {
        self.output.lock().unwrap().extend_from_slice(bytes);
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn get_byte(&self) -> u8 {
        self.input.lock().unwrap().pop_front().unwrap_or(0)
    }
}

#[derive(Default)]
struct FileData {
    bytes: Vec<u8>,
    deny_count: usize,
}

/// In-memory flat file system with fixed-size files.
#[derive(Default)]
pub struct MemFs {
    files: Mutex<BTreeMap<String, Arc<Mutex<FileData>>>>,
    open_handles: Arc<AtomicUsize>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, path: &str, contents: &[u8]) {
        let data = FileData {
            bytes: contents.to_vec(),
            deny_count: 0,
        };
        self.files
            .lock()
            .unwrap()
            .insert(path.to_owned(), Arc::new(Mutex::new(data)));
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        let files = self.files.lock().unwrap();
        files.get(path).map(|f| f.lock().unwrap().bytes.clone())
    }

    /// Handles opened and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }
}

impl FileSystem for MemFs {
    fn create(&self, path: &str, initial_size: u32) -> bool {
        let mut files = self.files.lock().unwrap();
        if path.is_empty() || files.contains_key(path) {
            return false;
        }
        let data = FileData {
            bytes: vec![0; initial_size as usize],
            deny_count: 0,
        };
        files.insert(path.to_owned(), Arc::new(Mutex::new(data)));
        true
    }

    fn remove(&self, path: &str) -> bool {
        self.files.lock().unwrap().remove(path).is_some()
    }

    fn open(&self, path: &str) -> Option<Box<dyn File>> {
        let data = Arc::clone(self.files.lock().unwrap().get(path)?);
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(MemFile {
            data,
            pos: 0,
            denying: false,
            handles: Arc::clone(&self.open_handles),
        }))
    }
}

struct MemFile {
    data: Arc<Mutex<FileData>>,
    pos: u32,
    denying: bool,
    handles: Arc<AtomicUsize>,
}

impl File for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let data = self.data.lock().unwrap();
        let start = (self.pos as usize).min(data.bytes.len());
        let n = buf.len().min(data.bytes.len() - start);
        buf[..n].copy_from_slice(&data.bytes[start..start + n]);
        self.pos += n as u32;
        n
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        let mut data = self.data.lock().unwrap();
        if data.deny_count > 0 {
            return 0;
        }
        let start = (self.pos as usize).min(data.bytes.len());
        let n = buf.len().min(data.bytes.len() - start);
        data.bytes[start..start + n].copy_from_slice(&buf[..n]);
        self.pos += n as u32;
        n
    }

    fn seek(&mut self, pos: u32) {
        self.pos = pos;
    }

    fn tell(&self) -> u32 {
        self.pos
    }

    fn length(&self) -> u32 {
        self.data.lock().unwrap().bytes.len() as u32
    }

    fn deny_write(&mut self) {
        if !self.denying {
            self.denying = true;
            self.data.lock().unwrap().deny_count += 1;
        }
    }
}

impl Drop for MemFile {
    fn drop(&mut self) {
        if self.denying {
            self.data.lock().unwrap().deny_count -= 1;
        }
        self.handles.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Counts power-off requests.
#[derive(Default)]
pub struct RecordingPower {
    offs: AtomicUsize,
}

impl RecordingPower {
    pub fn offs(&self) -> usize {
        self.offs.load(Ordering::SeqCst)
    }
}

impl PowerControl for RecordingPower {
    fn power_off(&self) {
        self.offs.fetch_add(1, Ordering::SeqCst);
    }
}

/// Start of the data area in every test image.
pub const DATA_BASE: u32 = 0x0804_8000;
/// Pages of data area.
pub const DATA_PAGES: usize = 4;
/// Where test images put the syscall words.
pub const STACK_ARGS: u32 = (USER_TOP - 64) as u32;
/// Value preloaded into `eax` to detect calls that leave it untouched.
pub const UNTOUCHED: u32 = 0xDEAD_BEEF;

/// A test image's memory, plus helpers to act as user code on it.
pub struct UserMemory {
    space: Arc<PagedMemory>,
    brk: u32,
}

impl UserMemory {
    pub fn new() -> Self {
        let space = Arc::new(PagedMemory::new());
        space
            .map_range(VirtAddr::from_word(DATA_BASE), DATA_PAGES, PageFlags::USER_RW)
            .unwrap();
        space
            .map(VirtAddr::new(USER_TOP - PAGE_SIZE), PageFlags::USER_RW)
            .unwrap();
        Self {
            space,
            brk: DATA_BASE,
        }
    }

    pub fn space(&self) -> &Arc<PagedMemory> {
        &self.space
    }

    /// Reserve `len` zeroed bytes in the data area.
    pub fn alloc(&mut self, len: usize) -> u32 {
        let at = self.brk;
        self.brk += len as u32;
        at
    }

    /// Place a NUL-terminated string in the data area.
    pub fn string(&mut self, s: &str) -> u32 {
        let at = self.alloc(s.len() + 1);
        self.poke(at, s.as_bytes());
        self.poke(at + s.len() as u32, &[0]);
        at
    }

    pub fn poke(&self, addr: u32, bytes: &[u8]) {
        self.space.copy_out(VirtAddr::from_word(addr), bytes).unwrap();
    }

    pub fn peek(&self, addr: u32, len: usize) -> Vec<u8> {
        let mut out = vec![0; len];
        self.space.copy_in(VirtAddr::from_word(addr), &mut out).unwrap();
        out
    }

    /// Trap with `esp` pointing at whatever is already there.
    pub fn trap_at(&self, cx: &mut UserContext<'_>, esp: u32) -> (Flow, u32) {
        let mut frame = TrapFrame::new(VirtAddr::from_word(esp));
        frame.eax = UNTOUCHED;
        let flow = cx.syscall(&mut frame);
        (flow, frame.eax)
    }

    /// Push `nr` and `args` on the stack and trap.
    pub fn call(&self, cx: &mut UserContext<'_>, nr: u32, args: &[u32]) -> (Flow, u32) {
        let words: Vec<u8> = std::iter::once(nr)
            .chain(args.iter().copied())
            .flat_map(u32::to_le_bytes)
            .collect();
        self.poke(STACK_ARGS, &words);
        self.trap_at(cx, STACK_ARGS)
    }

    /// `call` reduced to the signed return value.
    pub fn ret(&self, cx: &mut UserContext<'_>, nr: u32, args: &[u32]) -> i32 {
        self.call(cx, nr, args).1 as i32
    }
}

/// User code for a test program.
pub type Program = Arc<dyn Fn(&mut UserContext<'_>, &mut UserMemory) + Send + Sync>;

/// Loader serving registered test programs.
pub struct TestLoader {
    programs: Mutex<BTreeMap<String, Program>>,
    fs: Arc<MemFs>,
}

impl TestLoader {
    pub fn new(fs: Arc<MemFs>) -> Self {
        Self {
            programs: Mutex::new(BTreeMap::new()),
            fs,
        }
    }

    pub fn register(&self, name: &str, program: Program) {
        self.programs.lock().unwrap().insert(name.to_owned(), program);
    }
}

impl Loader for TestLoader {
    fn load(&self, command: &str) -> Option<Image> {
        let name = process_name(command);
        let program = Arc::clone(self.programs.lock().unwrap().get(name)?);
        let mut memory = UserMemory::new();
        let space: Arc<dyn AddressSpace> = memory.space().clone();
        Some(Image {
            space,
            entry: Box::new(move |cx: &mut UserContext<'_>| program(cx, &mut memory)),
            executable: self.fs.open(name),
        })
    }
}

/// A kernel wired to in-memory collaborators.
pub struct Harness {
    pub kernel: Arc<Kernel>,
    pub threads: Arc<StdThreads>,
    pub console: Arc<MemConsole>,
    pub fs: Arc<MemFs>,
    pub loader: Arc<TestLoader>,
    pub power: Arc<RecordingPower>,
}

impl Harness {
    pub fn new() -> Self {
        let threads = Arc::new(StdThreads::default());
        let console = Arc::new(MemConsole::new());
        let fs = Arc::new(MemFs::new());
        let loader = Arc::new(TestLoader::new(Arc::clone(&fs)));
        let power = Arc::new(RecordingPower::default());
        let kernel = Kernel::new(KernelServices {
            fs: fs.clone(),
            console: console.clone(),
            loader: loader.clone(),
            threads: threads.clone(),
            power: power.clone(),
        });
        Self {
            kernel,
            threads,
            console,
            fs,
            loader,
            power,
        }
    }

    pub fn program<F>(&self, name: &str, body: F)
    where
        F: Fn(&mut UserContext<'_>, &mut UserMemory) + Send + Sync + 'static,
    {
        self.loader.register(name, Arc::new(body));
    }

    /// Start `command` as the initial process and wait for every thread.
    pub fn run(&self, command: &str) {
        self.kernel.start(command).unwrap();
        self.threads.join_all();
    }
}

/// Values user programs report back to the test.
#[derive(Clone, Default)]
pub struct Notes(Arc<Mutex<Vec<i64>>>);

impl Notes {
    pub fn push(&self, value: impl Into<i64>) {
        self.0.lock().unwrap().push(value.into());
    }

    pub fn take(&self) -> Vec<i64> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// Address space wrapper that records validations and reads.
pub struct ProbeLog<'a> {
    inner: &'a dyn AddressSpace,
    validated: Mutex<BTreeSet<VirtAddr>>,
    validations: AtomicUsize,
    reads: Mutex<Vec<VirtAddr>>,
}

impl<'a> ProbeLog<'a> {
    pub fn new(inner: &'a dyn AddressSpace) -> Self {
        Self {
            inner,
            validated: Mutex::new(BTreeSet::new()),
            validations: AtomicUsize::new(0),
            reads: Mutex::new(Vec::new()),
        }
    }

    pub fn validations(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }

    pub fn was_read(&self, addr: VirtAddr) -> bool {
        self.reads.lock().unwrap().contains(&addr)
    }

    pub fn every_read_was_validated(&self) -> bool {
        let validated = self.validated.lock().unwrap();
        self.reads.lock().unwrap().iter().all(|a| validated.contains(a))
    }
}

impl AddressSpace for ProbeLog<'_> {
    fn translate(&self, addr: VirtAddr) -> Option<PageFlags> {
        self.inner.translate(addr)
    }

    fn is_mapped(&self, addr: VirtAddr) -> bool {
        self.validations.fetch_add(1, Ordering::SeqCst);
        self.validated.lock().unwrap().insert(addr);
        self.inner.is_mapped(addr)
    }

    fn copy_in(&self, addr: VirtAddr, dst: &mut [u8]) -> Result<(), MappingError> {
        {
            let mut reads = self.reads.lock().unwrap();
            reads.extend((0..dst.len()).filter_map(|i| addr.checked_add(i)));
        }
        self.inner.copy_in(addr, dst)
    }

    fn copy_out(&self, addr: VirtAddr, src: &[u8]) -> Result<(), MappingError> {
        self.inner.copy_out(addr, src)
    }
}
