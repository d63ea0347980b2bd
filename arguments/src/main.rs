use clap::{CommandFactory, Parser, ValueEnum, error::ErrorKind};
use log::info;

use arguments::{
    ArgumentsBuilder, ArgumentsVariant, CallStack, CountingRuntime, Env, Realm, Runtime,
    RuntimeFallback, new_heap, snapshot,
};
use heap::HeapSettings;
use object::Value;

const FIXNUM_RANGE: std::ops::Range<i64> = -(1i64 << 62)..(1i64 << 62);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Strict,
    Sloppy,
    Rest,
    All,
}

impl Mode {
    fn variants(self) -> &'static [ArgumentsVariant] {
        match self {
            Mode::Strict => &[ArgumentsVariant::Strict],
            Mode::Sloppy => &[ArgumentsVariant::Sloppy],
            Mode::Rest => &[ArgumentsVariant::Rest],
            Mode::All => &ArgumentsVariant::ALL,
        }
    }
}

/// Build arguments objects for a call with the given integer arguments and
/// print what they look like.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Declared formal parameters of the called function.
    #[arg(short, long, default_value_t = 0)]
    formals: usize,

    #[arg(short, long, value_enum, default_value_t = Mode::All)]
    mode: Mode,

    /// Heap block size in bytes.
    #[arg(long)]
    block_size: Option<usize>,

    /// Young generation ceiling in bytes.
    #[arg(long)]
    large_size: Option<usize>,

    /// Walk and check the heap at every safepoint and after building.
    #[arg(long)]
    verify: bool,

    /// Always take the general construction path.
    #[arg(long)]
    slow: bool,

    /// Actual arguments, in call order.
    #[arg(allow_negative_numbers = true)]
    values: Vec<i64>,
}

impl Cli {
    fn settings(&self) -> HeapSettings {
        let defaults = HeapSettings::default();
        HeapSettings {
            block_size: self.block_size.unwrap_or(defaults.block_size),
            large_size: self.large_size.unwrap_or(defaults.large_size),
            verify_on_safepoint: self.verify,
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let settings = cli.settings();
    if let Err(e) = settings.validate() {
        Cli::command().error(ErrorKind::InvalidValue, e).exit();
    }
    if let Some(n) = cli.values.iter().find(|n| !FIXNUM_RANGE.contains(n)) {
        Cli::command()
            .error(ErrorKind::InvalidValue, format!("{n} does not fit in a fixnum"))
            .exit();
    }

    let heap = new_heap(settings);
    let mut proxy = heap.proxy();
    let realm = Realm::new(&mut proxy);
    info!(
        "heap ready: block size {}, young ceiling {}",
        heap.settings.block_size,
        proxy.young_limit()
    );

    let values: Vec<Value> = cli.values.iter().map(|n| Value::from_i64(*n)).collect();
    let function = realm.new_function(&mut proxy, cli.formals);
    let context = realm.new_function_context(&mut proxy, function, &values);

    let mut stack = CallStack::new(values.len());
    stack.push_frame(function, &values);

    for &variant in cli.mode.variants() {
        let mut env = Env::new(&mut proxy, &realm.roots, &stack);
        let object = if cli.slow {
            Runtime.build(&mut env, variant, context, function)
        } else {
            let mut builder = ArgumentsBuilder::with_runtime(env, CountingRuntime::new(Runtime));
            let object = builder.build(variant, context, function);
            if builder.runtime().fallbacks() > 0 {
                info!("{variant}: request exceeds the young ceiling, built on the general path");
            }
            object
        };
        // SAFETY: just built against these roots, and nothing has run since
        let shown = unsafe { snapshot(&realm.roots, object) };
        println!("{variant}: {shown}");
    }

    stack.pop_frame();

    if cli.verify {
        match proxy.verify() {
            Ok(stats) => info!(
                "heap verified: {} objects, {} bytes, {} references",
                stats.objects, stats.bytes, stats.references
            ),
            Err(e) => {
                eprintln!("heap verification failed: {e}");
                std::process::exit(1);
            }
        }
    }
    info!("allocation stats: {:?}", proxy.stats);
}
