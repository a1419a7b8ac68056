// The binary only reports which numeric backend this build resolves to.
// All neural network logic lives in the library (src/lib.rs and its modules).
// Run the demo with:
//   cargo run --example xor
use ferrite_grad::Backend;

fn main() -> ferrite_grad::Result<()> {
    let info = Backend::detect().info();
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
