use std::collections::HashMap;
use std::path::{Path, PathBuf};

use prost_reflect::DescriptorPool;
use protox::file::{ChainFileResolver, File, FileResolver, GoogleFileResolver};

use recscope_api::SerdeError;

fn compile_err(e: protox::Error) -> SerdeError {
    SerdeError::config(format!("failed to compile protobuf sources: {e}"))
}

// ════════════════════════════════════════════════════════════════
//  In-memory sources (schema registry)
// ════════════════════════════════════════════════════════════════

/// `.proto` sources held in memory, keyed by import name.
#[derive(Debug, Clone, Default)]
pub struct InMemorySources {
    files: HashMap<String, String>,
}

impl InMemorySources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.files.insert(name.into(), source.into());
    }

    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }
}

impl FileResolver for InMemorySources {
    fn resolve_path(&self, path: &Path) -> Option<String> {
        path.to_str()
            .filter(|name| self.files.contains_key(*name))
            .map(str::to_owned)
    }

    fn open_file(&self, name: &str) -> Result<File, protox::Error> {
        match self.files.get(name) {
            Some(source) => File::from_source(name, source),
            None => Err(protox::Error::file_not_found(name)),
        }
    }
}

/// Compile `roots` (and everything they import) from in-memory sources.
/// Well-known `google/protobuf/*` imports resolve without being supplied.
pub fn compile_in_memory(sources: InMemorySources, roots: &[&str]) -> Result<DescriptorPool, SerdeError> {
    let mut resolver = ChainFileResolver::new();
    resolver.add(sources);
    resolver.add(GoogleFileResolver::new());

    let mut compiler = protox::Compiler::with_file_resolver(resolver);
    compiler.include_imports(true);
    compiler.open_files(roots).map_err(compile_err)?;
    Ok(compiler.descriptor_pool())
}

// ════════════════════════════════════════════════════════════════
//  File system
// ════════════════════════════════════════════════════════════════

/// All `.proto` files below `dir`, sorted.
pub fn find_proto_files(dir: &Path) -> Result<Vec<PathBuf>, SerdeError> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = std::fs::read_dir(&current)
            .map_err(|e| SerdeError::config(format!("cannot read proto directory {}: {e}", current.display())))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "proto") {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Compile every `.proto` file under `root`, with `root` first in the
/// include path followed by `import_paths`.
pub fn compile_directory(root: &Path, import_paths: &[PathBuf]) -> Result<DescriptorPool, SerdeError> {
    let files = find_proto_files(root)?;
    if files.is_empty() {
        return Ok(DescriptorPool::new());
    }
    let includes = std::iter::once(root.to_path_buf()).chain(import_paths.iter().cloned());
    let mut compiler = protox::Compiler::new(includes).map_err(compile_err)?;
    compiler.include_imports(true);
    compiler.open_files(&files).map_err(compile_err)?;
    Ok(compiler.descriptor_pool())
}

/// Copy every file of `from` into `into`. Files already present with the
/// same content are skipped by the pool.
pub fn merge_pool(into: &mut DescriptorPool, from: &DescriptorPool) -> Result<(), SerdeError> {
    into.add_file_descriptor_protos(from.file_descriptor_protos().cloned())
        .map_err(|e| SerdeError::config(format!("conflicting protobuf descriptors: {e}")))
}
