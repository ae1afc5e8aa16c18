use std::{fs, path::PathBuf, rc::Rc};

use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use docscript::{
    Document, Element, Repl, Runtime, RuntimeConfig, Scope, ScriptError, value::string_to_number,
};

#[derive(Parser)]
#[command(author, version, about = "Script interpreter over host documents")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Compile SOURCE as a function and invoke it with the fields as `this`
    Eval {
        source: String,
        #[command(flatten)]
        receiver: ReceiverArgs,
    },
    /// Evaluate a script file with the fields as `this`
    Run {
        script: PathBuf,
        #[command(flatten)]
        receiver: ReceiverArgs,
    },
    /// Start an interactive session
    Repl {
        /// Script heap budget in bytes
        #[arg(long)]
        memory_budget: Option<usize>,
    },
}

#[derive(ClapArgs)]
struct ReceiverArgs {
    /// Receiver field as `name=value`; numbers, booleans and `null` are typed
    #[arg(long = "field", value_name = "NAME=VALUE", value_parser = parse_field)]
    fields: Vec<(String, Element)>,
    /// Script heap budget in bytes
    #[arg(long)]
    memory_budget: Option<usize>,
}

impl ReceiverArgs {
    fn document(&self) -> Rc<Document> {
        Rc::new(self.fields.iter().cloned().collect())
    }
}

fn parse_field(raw: &str) -> Result<(String, Element), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{raw}`"))?;
    if name.is_empty() {
        return Err("field name must not be empty".to_string());
    }
    let element = match value {
        "true" => Element::Boolean(true),
        "false" => Element::Boolean(false),
        "null" => Element::Null,
        _ => {
            let number = string_to_number(value);
            if value.trim().is_empty() || number.is_nan() {
                Element::String(value.to_string())
            } else {
                Element::Double(number)
            }
        }
    };
    Ok((name.to_string(), element))
}

fn runtime(memory_budget: Option<usize>) -> Result<Runtime, ScriptError> {
    let mut config = RuntimeConfig::default();
    if let Some(budget) = memory_budget {
        config.memory_budget = budget;
    }
    Runtime::new(config)
}

fn receiver_scope(runtime: &Runtime, receiver: &ReceiverArgs) -> Result<Scope, ScriptError> {
    let mut scope = runtime.create_scope()?;
    scope.set_this(&receiver.document())?;
    Ok(scope)
}

fn main() -> Result<(), ScriptError> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_env("DOCSCRIPT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match args.command.unwrap_or(Command::Repl {
        memory_budget: None,
    }) {
        Command::Eval { source, receiver } => {
            let runtime = runtime(receiver.memory_budget)?;
            let mut scope = receiver_scope(&runtime, &receiver)?;
            let function = scope.create_function(&source)?;
            let result = scope.invoke(&function, None)?;
            println!("{result}");
            Ok(())
        }
        Command::Run { script, receiver } => {
            let source = fs::read_to_string(&script)?;
            let runtime = runtime(receiver.memory_budget)?;
            let mut scope = receiver_scope(&runtime, &receiver)?;
            scope.eval(&source)?;
            Ok(())
        }
        Command::Repl { memory_budget } => {
            let runtime = runtime(memory_budget)?;
            let mut repl = Repl::new(&runtime)?;
            repl.run()
        }
    }
}
