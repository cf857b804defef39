//! Headless graphics context for unit tests.

use std::cell::Cell;

use anyhow::Result;

use super::program::{GraphicsContext, ShaderProgram, UniformTable};
use super::reflect::reflect;
use crate::error::CompileError;

/// Validates shaders with naga and counts draws instead of touching a GPU.
#[derive(Default)]
pub struct MockContext {
    draws: Cell<usize>,
}

impl MockContext {
    pub fn draws(&self) -> usize {
        self.draws.get()
    }
}

pub struct MockProgram {
    table: UniformTable,
}

impl ShaderProgram for MockProgram {
    fn uniforms(&self) -> &UniformTable {
        &self.table
    }

    fn uniforms_mut(&mut self) -> &mut UniformTable {
        &mut self.table
    }
}

impl GraphicsContext for MockContext {
    type Program = MockProgram;

    fn program(&self, vertex_src: &str, fragment_src: &str) -> Result<MockProgram, CompileError> {
        let reflection = reflect(vertex_src, fragment_src)?;
        Ok(MockProgram {
            table: UniformTable::new(&reflection),
        })
    }

    fn draw(&self, _program: &mut MockProgram) -> Result<()> {
        self.draws.set(self.draws.get() + 1);
        Ok(())
    }
}
