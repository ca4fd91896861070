// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Designs compiled with CXXRTL into a shared library, driven through the
//! CXXRTL C API.

use anyhow::{Context, Result};
use padring_config::DesignConfig;
use padring_core::{Design, Direction, PinId, PinSpace, SimResult, SimulationError};
use std::ffi::{c_char, c_void, CString};
use std::path::Path;

/// Mirror of `struct cxxrtl_object` from `cxxrtl_capi.h`.
#[repr(C)]
#[allow(dead_code)]
struct CxxrtlObject {
    kind: u32,
    flags: u32,
    width: usize,
    lsb_at: usize,
    depth: usize,
    zero_at: usize,
    curr: *mut u32,
    next: *mut u32,
    outline: *mut c_void,
    attrs: *mut c_void,
}

type ToplevelFn = unsafe extern "C" fn() -> *mut c_void;
type CreateFn = unsafe extern "C" fn(*mut c_void) -> *mut c_void;
type CreateAtFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> *mut c_void;
type DestroyFn = unsafe extern "C" fn(*mut c_void);
type StepFn = unsafe extern "C" fn(*mut c_void) -> usize;
type GetPartsFn = unsafe extern "C" fn(*mut c_void, *const c_char, *mut usize) -> *mut CxxrtlObject;

struct Port {
    pin: PinId,
    direction: Direction,
    mask: u32,
    object: *mut CxxrtlObject,
}

pub struct CxxrtlDesign {
    handle: *mut c_void,
    step_fn: StepFn,
    get_parts_fn: GetPartsFn,
    destroy_fn: DestroyFn,
    ports: Vec<Port>,
    // Must outlive every function pointer above.
    _lib: libloading::Library,
}

impl std::fmt::Debug for CxxrtlDesign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CxxrtlDesign({} ports)", self.ports.len())
    }
}

impl CxxrtlDesign {
    pub fn load(library: &Path, config: &DesignConfig) -> Result<Self> {
        let lib = unsafe { libloading::Library::new(library) }
            .with_context(|| format!("Failed to load design library {:?}", library))?;

        let toplevel_fn: ToplevelFn = unsafe {
            *lib.get(config.toplevel_symbol.as_bytes()).with_context(|| {
                format!("Design library has no '{}' symbol", config.toplevel_symbol)
            })?
        };
        let create_fn: CreateFn = unsafe { *lib.get(b"cxxrtl_create")? };
        let create_at_fn: CreateAtFn = unsafe { *lib.get(b"cxxrtl_create_at")? };
        let destroy_fn: DestroyFn = unsafe { *lib.get(b"cxxrtl_destroy")? };
        let step_fn: StepFn = unsafe { *lib.get(b"cxxrtl_step")? };
        let get_parts_fn: GetPartsFn = unsafe { *lib.get(b"cxxrtl_get_parts")? };

        let toplevel = unsafe { toplevel_fn() };
        if toplevel.is_null() {
            anyhow::bail!("'{}' returned no design", config.toplevel_symbol);
        }
        let handle = match &config.top_path {
            Some(path) => {
                let path = CString::new(path.as_str()).context("Invalid top_path")?;
                unsafe { create_at_fn(toplevel, path.as_ptr()) }
            }
            None => unsafe { create_fn(toplevel) },
        };
        if handle.is_null() {
            anyhow::bail!("cxxrtl_create failed for {:?}", library);
        }
        tracing::info!("Loaded design from {:?}", library);

        Ok(Self {
            handle,
            step_fn,
            get_parts_fn,
            destroy_fn,
            ports: Vec::new(),
            _lib: lib,
        })
    }

    fn lookup(&self, name: &str) -> Option<*mut CxxrtlObject> {
        let name = CString::new(name).ok()?;
        let mut parts = 0usize;
        let object = unsafe { (self.get_parts_fn)(self.handle, name.as_ptr(), &mut parts) };
        (!object.is_null() && parts == 1).then_some(object)
    }
}

impl Design for CxxrtlDesign {
    fn bind(&mut self, pins: &PinSpace) -> SimResult<()> {
        let mut ports = Vec::with_capacity(pins.len());
        let mut missing = Vec::new();
        for pin in pins.iter() {
            let Some(object) = self.lookup(pin.name) else {
                missing.push(pin.name.to_string());
                continue;
            };
            let width = unsafe { (*object).width };
            if width != pin.width.bits() as usize {
                return Err(SimulationError::WidthMismatch {
                    name: pin.name.to_string(),
                    expected: pin.width.bits(),
                    actual: width.min(u8::MAX as usize) as u8,
                });
            }
            ports.push(Port {
                pin: pin.id,
                direction: pin.direction,
                mask: pin.width.mask() as u32,
                object,
            });
        }
        if !missing.is_empty() {
            return Err(SimulationError::DesignBinding(format!(
                "design has no port named {}",
                missing.join(", ")
            )));
        }
        tracing::debug!("Bound {} design ports", ports.len());
        self.ports = ports;
        Ok(())
    }

    fn step(&mut self, pins: &mut PinSpace) {
        for port in &self.ports {
            if port.direction == Direction::ToDesign {
                let value = pins.read(port.pin) as u32 & port.mask;
                // Values have no separate next state; wires are committed by step.
                unsafe {
                    let object = &*port.object;
                    let target = if object.next.is_null() { object.curr } else { object.next };
                    *target = value;
                }
            }
        }

        unsafe { (self.step_fn)(self.handle) };

        for port in &self.ports {
            if port.direction == Direction::FromDesign {
                let value = unsafe { *(*port.object).curr } & port.mask;
                pins.publish(port.pin, value as u8);
            }
        }
    }
}

impl Drop for CxxrtlDesign {
    fn drop(&mut self) {
        unsafe { (self.destroy_fn)(self.handle) };
    }
}
