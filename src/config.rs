/// Knobs shared by the backends and the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Run the optimisation pipeline (constant folding for the interpreter,
    /// the function pass manager for LLVM) on each finished function.
    pub optimize: bool,
    /// Nesting limit for calls made while running compiled code.
    pub max_call_depth: usize,
    /// Print generated IR after every top-level construct.
    pub dump_ir: bool,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            optimize: true,
            max_call_depth: 1024,
            dump_ir: true,
        }
    }
}
