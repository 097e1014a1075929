//! LLVM backend. Functions live in one long-lived module; running a function
//! JIT-compiles a clone of that module with MCJIT, so later definitions can
//! still be added to the long-lived one.

use super::{Backend, BinOp};
use crate::config::Options;
use crate::error::{Error, ErrorKind};
use crate::runtime::builtins;
use libc::{c_char, c_void};
use llvm_sys::analysis::{LLVMVerifierFailureAction, LLVMVerifyFunction};
use llvm_sys::execution_engine;
use llvm_sys::prelude::*;
use llvm_sys::transforms::scalar;
use llvm_sys::{core, target, LLVMRealPredicate};
use std::ffi::{CStr, CString};
use std::mem;
use std::ptr;

fn backend_error<T>(msg: String) -> Result<T, Error> {
    Err(Error::from(ErrorKind::Backend(msg)))
}

fn c_name(name: &str) -> Result<CString, Error> {
    CString::new(name).or_else(|_| backend_error(format!("name {:?} contains a NUL byte", name)))
}

unsafe fn take_message(message: *mut c_char) -> String {
    if message.is_null() {
        return String::new();
    }
    let text = CStr::from_ptr(message).to_string_lossy().into_owned();
    core::LLVMDisposeMessage(message);
    text
}

pub struct LlvmBackend {
    context: LLVMContextRef,
    module: LLVMModuleRef,
    builder: LLVMBuilderRef,
    fpm: LLVMPassManagerRef,
    double_type: LLVMTypeRef,
    optimize: bool,
}

impl LlvmBackend {
    pub fn new(options: &Options) -> Result<LlvmBackend, Error> {
        unsafe {
            execution_engine::LLVMLinkInMCJIT();
            if target::LLVM_InitializeNativeTarget() != 0 {
                return backend_error("could not initialise the native target".to_owned());
            }
            if target::LLVM_InitializeNativeAsmPrinter() != 0 {
                return backend_error("could not initialise the native asm printer".to_owned());
            }

            let context = core::LLVMContextCreate();
            let module = core::LLVMModuleCreateWithNameInContext(
                b"my cool jit\0".as_ptr() as *const _,
                context,
            );
            let builder = core::LLVMCreateBuilderInContext(context);
            let double_type = core::LLVMDoubleTypeInContext(context);

            let fpm = core::LLVMCreateFunctionPassManagerForModule(module);
            if options.optimize {
                scalar::LLVMAddBasicAliasAnalysisPass(fpm);
                scalar::LLVMAddReassociatePass(fpm);
                scalar::LLVMAddGVNPass(fpm);
                scalar::LLVMAddCFGSimplificationPass(fpm);
            }
            core::LLVMInitializeFunctionPassManager(fpm);

            Ok(LlvmBackend {
                context,
                module,
                builder,
                fpm,
                double_type,
                optimize: options.optimize,
            })
        }
    }

    fn function_name(&self, function: LLVMValueRef) -> String {
        unsafe {
            CStr::from_ptr(core::LLVMGetValueName(function))
                .to_string_lossy()
                .into_owned()
        }
    }
}

impl Drop for LlvmBackend {
    fn drop(&mut self) {
        unsafe {
            core::LLVMDisposePassManager(self.fpm);
            core::LLVMDisposeBuilder(self.builder);
            core::LLVMDisposeModule(self.module);
            core::LLVMContextDispose(self.context);
        }
    }
}

impl Backend for LlvmBackend {
    type Value = LLVMValueRef;
    type Function = LLVMValueRef;
    type Block = LLVMBasicBlockRef;

    fn const_f64(&mut self, value: f64) -> Result<LLVMValueRef, Error> {
        Ok(unsafe { core::LLVMConstReal(self.double_type, value) })
    }

    fn get_function(&self, name: &str) -> Option<LLVMValueRef> {
        let name = CString::new(name).ok()?;
        let f = unsafe { core::LLVMGetNamedFunction(self.module, name.as_ptr()) };
        if f.is_null() {
            None
        } else {
            Some(f)
        }
    }

    fn declare_function(&mut self, name: &str, params: &[String]) -> Result<LLVMValueRef, Error> {
        if self.get_function(name).is_some() {
            return backend_error(format!("function '{}' is already declared", name));
        }
        let cname = c_name(name)?;
        let param_names = params
            .iter()
            .map(|p| c_name(p))
            .collect::<Result<Vec<_>, _>>()?;
        unsafe {
            let mut param_types = vec![self.double_type; params.len()];
            let fn_type = core::LLVMFunctionType(
                self.double_type,
                param_types.as_mut_ptr(),
                params.len() as u32,
                0,
            );
            let f = core::LLVMAddFunction(self.module, cname.as_ptr(), fn_type);
            for (i, p) in param_names.iter().enumerate() {
                core::LLVMSetValueName(core::LLVMGetParam(f, i as u32), p.as_ptr());
            }
            Ok(f)
        }
    }

    fn param_count(&self, function: LLVMValueRef) -> usize {
        unsafe { core::LLVMCountParams(function) as usize }
    }

    fn param(&self, function: LLVMValueRef, index: usize) -> Result<LLVMValueRef, Error> {
        if index >= self.param_count(function) {
            return backend_error(format!(
                "'{}' has no parameter #{}",
                self.function_name(function),
                index
            ));
        }
        Ok(unsafe { core::LLVMGetParam(function, index as u32) })
    }

    fn has_body(&self, function: LLVMValueRef) -> bool {
        unsafe { core::LLVMCountBasicBlocks(function) > 0 }
    }

    fn erase(&mut self, function: LLVMValueRef) {
        unsafe {
            let block = core::LLVMGetInsertBlock(self.builder);
            if !block.is_null() && core::LLVMGetBasicBlockParent(block) == function {
                core::LLVMClearInsertionPosition(self.builder);
            }
            core::LLVMDeleteFunction(function);
        }
    }

    fn append_block(
        &mut self,
        function: LLVMValueRef,
        name: &str,
    ) -> Result<LLVMBasicBlockRef, Error> {
        let cname = c_name(name)?;
        Ok(unsafe { core::LLVMAppendBasicBlockInContext(self.context, function, cname.as_ptr()) })
    }

    fn position_at_end(&mut self, block: LLVMBasicBlockRef) {
        unsafe { core::LLVMPositionBuilderAtEnd(self.builder, block) }
    }

    fn current_block(&self) -> Result<LLVMBasicBlockRef, Error> {
        let block = unsafe { core::LLVMGetInsertBlock(self.builder) };
        if block.is_null() {
            return backend_error("no insertion point".to_owned());
        }
        Ok(block)
    }

    fn current_function(&self) -> Result<LLVMValueRef, Error> {
        let block = self.current_block()?;
        Ok(unsafe { core::LLVMGetBasicBlockParent(block) })
    }

    fn build_binary(
        &mut self,
        op: BinOp,
        lhs: LLVMValueRef,
        rhs: LLVMValueRef,
        name: &str,
    ) -> Result<LLVMValueRef, Error> {
        let cname = c_name(name)?;
        unsafe {
            Ok(match op {
                BinOp::Add => core::LLVMBuildFAdd(self.builder, lhs, rhs, cname.as_ptr()),
                BinOp::Sub => core::LLVMBuildFSub(self.builder, lhs, rhs, cname.as_ptr()),
                BinOp::Mul => core::LLVMBuildFMul(self.builder, lhs, rhs, cname.as_ptr()),
                BinOp::Lt => {
                    let i = core::LLVMBuildFCmp(
                        self.builder,
                        LLVMRealPredicate::LLVMRealULT,
                        lhs,
                        rhs,
                        b"cmptmp\0".as_ptr() as *const _,
                    );
                    core::LLVMBuildUIToFP(self.builder, i, self.double_type, cname.as_ptr())
                }
            })
        }
    }

    fn build_truth(&mut self, value: LLVMValueRef, name: &str) -> Result<LLVMValueRef, Error> {
        let cname = c_name(name)?;
        unsafe {
            let zero = core::LLVMConstReal(self.double_type, 0.0);
            Ok(core::LLVMBuildFCmp(
                self.builder,
                LLVMRealPredicate::LLVMRealONE,
                value,
                zero,
                cname.as_ptr(),
            ))
        }
    }

    fn build_br(&mut self, dest: LLVMBasicBlockRef) -> Result<(), Error> {
        unsafe { core::LLVMBuildBr(self.builder, dest) };
        Ok(())
    }

    fn build_cond_br(
        &mut self,
        cond: LLVMValueRef,
        then: LLVMBasicBlockRef,
        otherwise: LLVMBasicBlockRef,
    ) -> Result<(), Error> {
        unsafe { core::LLVMBuildCondBr(self.builder, cond, then, otherwise) };
        Ok(())
    }

    fn build_phi(&mut self, name: &str) -> Result<LLVMValueRef, Error> {
        let cname = c_name(name)?;
        Ok(unsafe { core::LLVMBuildPhi(self.builder, self.double_type, cname.as_ptr()) })
    }

    fn add_incoming(
        &mut self,
        phi: LLVMValueRef,
        value: LLVMValueRef,
        block: LLVMBasicBlockRef,
    ) -> Result<(), Error> {
        let mut values = [value];
        let mut blocks = [block];
        unsafe { core::LLVMAddIncoming(phi, values.as_mut_ptr(), blocks.as_mut_ptr(), 1) };
        Ok(())
    }

    fn build_call(
        &mut self,
        callee: LLVMValueRef,
        args: &[LLVMValueRef],
        name: &str,
    ) -> Result<LLVMValueRef, Error> {
        let expected = self.param_count(callee);
        if expected != args.len() {
            return Err(Error::from(ErrorKind::ArgumentCount {
                callee: self.function_name(callee),
                expected,
                found: args.len(),
            }));
        }
        let cname = c_name(name)?;
        let mut args = args.to_vec();
        Ok(unsafe {
            core::LLVMBuildCall(
                self.builder,
                callee,
                args.as_mut_ptr(),
                args.len() as u32,
                cname.as_ptr(),
            )
        })
    }

    fn build_ret(&mut self, value: LLVMValueRef) -> Result<(), Error> {
        unsafe { core::LLVMBuildRet(self.builder, value) };
        Ok(())
    }

    fn finalize(&mut self, function: LLVMValueRef) -> Result<(), Error> {
        unsafe {
            if LLVMVerifyFunction(function, LLVMVerifierFailureAction::LLVMReturnStatusAction) != 0
            {
                return backend_error(format!(
                    "'{}' failed verification",
                    self.function_name(function)
                ));
            }
            if self.optimize {
                core::LLVMRunFunctionPassManager(self.fpm, function);
            }
        }
        Ok(())
    }

    fn run(&mut self, function: LLVMValueRef) -> Result<f64, Error> {
        if self.param_count(function) != 0 {
            return Err(Error::from(ErrorKind::Execution(format!(
                "'{}' takes arguments",
                self.function_name(function)
            ))));
        }
        let name = c_name(&self.function_name(function))?;
        let natives = builtins()
            .iter()
            .map(|(native, f)| Ok((c_name(native)?, *f)))
            .collect::<Result<Vec<_>, Error>>()?;

        unsafe {
            let module = core::LLVMCloneModule(self.module);
            let mut engine: execution_engine::LLVMExecutionEngineRef = ptr::null_mut();
            let mut error: *mut c_char = ptr::null_mut();
            let mut options: execution_engine::LLVMMCJITCompilerOptions = mem::zeroed();
            execution_engine::LLVMInitializeMCJITCompilerOptions(
                &mut options,
                mem::size_of::<execution_engine::LLVMMCJITCompilerOptions>(),
            );
            if execution_engine::LLVMCreateMCJITCompilerForModule(
                &mut engine,
                module,
                &mut options,
                mem::size_of::<execution_engine::LLVMMCJITCompilerOptions>(),
                &mut error,
            ) != 0
            {
                return Err(Error::from(ErrorKind::Execution(take_message(error))));
            }

            for (native_name, f) in &natives {
                let decl = core::LLVMGetNamedFunction(module, native_name.as_ptr());
                if !decl.is_null() {
                    execution_engine::LLVMAddGlobalMapping(
                        engine,
                        decl,
                        *f as usize as *mut c_void,
                    );
                }
            }

            let address = execution_engine::LLVMGetFunctionAddress(engine, name.as_ptr());
            if address == 0 {
                execution_engine::LLVMDisposeExecutionEngine(engine);
                return Err(Error::from(ErrorKind::Execution(format!(
                    "could not find '{}' in the JIT",
                    name.to_string_lossy()
                ))));
            }
            let compiled: extern "C" fn() -> f64 = mem::transmute(address as usize);
            let result = compiled();
            // disposes the cloned module too
            execution_engine::LLVMDisposeExecutionEngine(engine);
            Ok(result)
        }
    }

    fn dump(&self, function: LLVMValueRef) -> String {
        unsafe { take_message(core::LLVMPrintValueToString(function)) }
    }

    fn dump_module(&self) -> String {
        unsafe { take_message(core::LLVMPrintModuleToString(self.module)) }
    }
}
