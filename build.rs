// Build script to compile the demo's GLSL shaders to SPIR-V
//
// The library never needs these; the demo loads the .spv files at runtime
// and only clears the screen when they are missing. A missing glslc is
// therefore a warning, a shader that fails to compile is a build error.

use std::path::Path;
use std::process::Command;

const SHADERS: [&str; 2] = ["shaders/triangle.vert", "shaders/triangle.frag"];

fn main() {
    println!("cargo:rerun-if-changed=shaders/");

    for shader in SHADERS {
        compile_shader(shader, &format!("{shader}.spv"));
    }
}

fn compile_shader(input: &str, output: &str) {
    let input_path = Path::new(input);
    if !input_path.exists() {
        println!("cargo:warning={input} is missing, skipping");
        return;
    }

    let result = Command::new("glslc")
        .arg(input_path)
        .arg("-o")
        .arg(Path::new(output))
        .status();

    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input, status.code());
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({e}); {input} was not compiled");
            println!("cargo:warning=Install the Vulkan SDK or run: glslc {input} -o {output}");
        }
    }
}
