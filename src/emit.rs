//! Program emitter: wraps generated functions into a Morpho module.

use std::path::Path;

use crate::codegen::CompiledFunction;

/// Render the complete assembly text for a module named `module_name`.
///
/// The module's artifact is `<module_name>.mexe` and its entry point is the
/// function `main`.
pub fn render_module(module_name: &str, functions: &[CompiledFunction]) -> String {
  let mut asm = String::new();
  asm.push_str(&format!("\"{module_name}.mexe\" = main in\n"));
  asm.push_str("!\n");
  asm.push_str("{{\n");
  for function in functions {
    asm.push_str(&format!("#\"{}[f{}]\" =\n", function.name, function.arity));
    asm.push_str("[\n");
    for instruction in &function.code {
      asm.push_str(&format!("{instruction}\n"));
    }
    asm.push_str("];\n");
  }
  asm.push_str("}}\n");
  asm.push_str("*\n");
  asm.push_str("BASIS;\n");
  asm
}

/// Module name for a source path: the file name without its final extension.
pub fn module_name(path: &Path) -> String {
  path
    .file_stem()
    .map(|stem| stem.to_string_lossy().into_owned())
    .unwrap_or_default()
}
