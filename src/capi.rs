//! C entry points for embedding the engine as a shared library
//!
//! Hosts load the `cdylib` build and drive the engine through these
//! functions; record batches cross the boundary as struct arrays via the
//! Arrow C Data Interface.
//!
//! Conventions: status-returning functions yield 0 on success and a non-zero
//! code on failure, with the message retrievable through [`dbe_last_error`].
//! Handle-returning functions yield null on failure. Every handle must be
//! released exactly once (`dbe_engine_close`, `dbe_cursor_free`); passing a
//! released or foreign pointer is undefined behavior.

use std::cell::RefCell;
use std::ffi::{c_char, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

use arrow::array::{Array, StructArray};
use arrow::ffi::{from_ffi, to_ffi, FFI_ArrowArray, FFI_ArrowSchema};
use arrow::record_batch::RecordBatch;

use crate::engine::{Cursor, Engine};
use crate::error::{EngineError, Result};

/// Success status
pub const DBE_OK: i32 = 0;
/// Generic failure status; details via [`dbe_last_error`]
pub const DBE_ERROR: i32 = 1;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(err: impl std::fmt::Display) {
    let msg = CString::new(err.to_string()).unwrap_or_default();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(msg));
}

fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

/// Message for the most recent failure on this thread, or null.
///
/// The pointer stays valid until the next engine call on the same thread.
#[no_mangle]
pub extern "C" fn dbe_last_error() -> *const c_char {
    LAST_ERROR.with(|slot| {
        slot.borrow()
            .as_ref()
            .map(|msg| msg.as_ptr())
            .unwrap_or(ptr::null())
    })
}

/// Run a fallible body, translating errors and panics to a status code
fn status_guard(body: impl FnOnce() -> Result<()>) -> i32 {
    clear_last_error();
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => DBE_OK,
        Ok(Err(err)) => {
            set_last_error(err);
            DBE_ERROR
        }
        Err(_) => {
            set_last_error("engine panicked");
            DBE_ERROR
        }
    }
}

unsafe fn cstr_arg<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(EngineError::InvalidArgument(format!("{} is null", what)));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| EngineError::InvalidArgument(format!("{} is not valid UTF-8", what)))
}

/// Open an engine handle with default configuration. Null on failure.
#[no_mangle]
pub extern "C" fn dbe_engine_open() -> *mut Engine {
    clear_last_error();
    match Engine::open() {
        Ok(engine) => Box::into_raw(Box::new(engine)),
        Err(err) => {
            set_last_error(err);
            ptr::null_mut()
        }
    }
}

/// Whether the handle has been marked closed. False for a null handle.
///
/// # Safety
/// `engine` must be a live handle from [`dbe_engine_open`], or null.
#[no_mangle]
pub unsafe extern "C" fn dbe_engine_is_closed(engine: *const Engine) -> bool {
    if engine.is_null() {
        return false;
    }
    (*engine).closed()
}

/// Close and destroy an engine handle. Null is ignored.
///
/// # Safety
/// `engine` must be a live handle from [`dbe_engine_open`], or null; it must
/// not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn dbe_engine_close(engine: *mut Engine) {
    if engine.is_null() {
        return;
    }
    let mut engine = Box::from_raw(engine);
    engine.close();
}

/// Import a record batch as a named table.
///
/// The batch is passed as an exported Arrow struct array; both structures
/// are consumed (moved into the engine) on success or failure.
///
/// # Safety
/// `engine` must be a live handle; `name` a NUL-terminated string; `array`
/// and `schema` valid exported Arrow C Data Interface structures.
#[no_mangle]
pub unsafe extern "C" fn dbe_engine_import_arrow_table(
    engine: *mut Engine,
    name: *const c_char,
    array: *mut FFI_ArrowArray,
    schema: *mut FFI_ArrowSchema,
) -> i32 {
    status_guard(|| {
        if engine.is_null() {
            return Err(EngineError::InvalidArgument("engine is null".into()));
        }
        if array.is_null() || schema.is_null() {
            return Err(EngineError::InvalidArgument(
                "array/schema pointer is null".into(),
            ));
        }

        let name = cstr_arg(name, "table name")?;

        // Take ownership of the C structures, leaving empty shells behind
        let array = ptr::replace(array, FFI_ArrowArray::empty());
        let schema = ptr::replace(schema, FFI_ArrowSchema::empty());

        let data = from_ffi(array, &schema)?;
        let batch = RecordBatch::from(StructArray::from(data));

        (*engine).import_record_batch(name, batch)
    })
}

/// Execute a SQL query, returning a cursor handle. Null on failure.
///
/// # Safety
/// `engine` must be a live handle; `sql` a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn dbe_engine_execute_dml(
    engine: *const Engine,
    sql: *const c_char,
) -> *mut Cursor {
    clear_last_error();

    let result = catch_unwind(AssertUnwindSafe(|| -> Result<Cursor> {
        if engine.is_null() {
            return Err(EngineError::InvalidArgument("engine is null".into()));
        }
        let sql = cstr_arg(sql, "sql")?;
        (*engine).execute_dml(sql)
    }));

    match result {
        Ok(Ok(cursor)) => Box::into_raw(Box::new(cursor)),
        Ok(Err(err)) => {
            set_last_error(err);
            ptr::null_mut()
        }
        Err(_) => {
            set_last_error("engine panicked");
            ptr::null_mut()
        }
    }
}

/// Number of result rows behind a cursor. Zero for a null handle.
///
/// # Safety
/// `cursor` must be a live handle from [`dbe_engine_execute_dml`], or null.
#[no_mangle]
pub unsafe extern "C" fn dbe_cursor_row_count(cursor: *const Cursor) -> u64 {
    if cursor.is_null() {
        return 0;
    }
    (*cursor).row_count() as u64
}

/// Materialize the cursor's result into `out_array`/`out_schema` as an
/// exported Arrow struct array. Consumes the cursor's result; a second call
/// fails.
///
/// # Safety
/// `cursor` must be a live handle; `out_array` and `out_schema` must point
/// to writable structures. On success the caller owns the exported data and
/// must release it through the Arrow C Data Interface.
#[no_mangle]
pub unsafe extern "C" fn dbe_cursor_arrow_record_batch(
    cursor: *mut Cursor,
    out_array: *mut FFI_ArrowArray,
    out_schema: *mut FFI_ArrowSchema,
) -> i32 {
    status_guard(|| {
        if cursor.is_null() {
            return Err(EngineError::InvalidArgument("cursor is null".into()));
        }
        if out_array.is_null() || out_schema.is_null() {
            return Err(EngineError::InvalidArgument(
                "output pointer is null".into(),
            ));
        }

        let batch = (*cursor).arrow_record_batch()?;
        let data = StructArray::from(batch).into_data();
        let (ffi_array, ffi_schema) = to_ffi(&data)?;

        ptr::write(out_array, ffi_array);
        ptr::write(out_schema, ffi_schema);
        Ok(())
    })
}

/// Destroy a cursor handle. Null is ignored.
///
/// # Safety
/// `cursor` must be a live handle from [`dbe_engine_execute_dml`], or null;
/// it must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn dbe_cursor_free(cursor: *mut Cursor) {
    if !cursor.is_null() {
        drop(Box::from_raw(cursor));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn export_batch(batch: RecordBatch) -> (FFI_ArrowArray, FFI_ArrowSchema) {
        let data = StructArray::from(batch).into_data();
        to_ffi(&data).unwrap()
    }

    fn test_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec!["a", "b", "c"])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_c_surface_roundtrip() {
        let engine = dbe_engine_open();
        assert!(!engine.is_null());

        unsafe {
            assert!(!dbe_engine_is_closed(engine));

            // Import through the C data interface
            let (mut array, mut schema) = export_batch(test_batch());
            let name = CString::new("items").unwrap();
            let status =
                dbe_engine_import_arrow_table(engine, name.as_ptr(), &mut array, &mut schema);
            assert_eq!(status, DBE_OK);

            // Query
            let sql = CString::new("SELECT id FROM items WHERE id > 1").unwrap();
            let cursor = dbe_engine_execute_dml(engine, sql.as_ptr());
            assert!(!cursor.is_null());
            assert_eq!(dbe_cursor_row_count(cursor), 2);

            // Export the result and re-import it on the Rust side
            let mut out_array = FFI_ArrowArray::empty();
            let mut out_schema = FFI_ArrowSchema::empty();
            let status = dbe_cursor_arrow_record_batch(cursor, &mut out_array, &mut out_schema);
            assert_eq!(status, DBE_OK);

            let data = from_ffi(out_array, &out_schema).unwrap();
            let batch = RecordBatch::from(StructArray::from(data));
            assert_eq!(batch.num_rows(), 2);
            assert_eq!(batch.num_columns(), 1);

            // Cursor is consumed now
            let mut out_array = FFI_ArrowArray::empty();
            let mut out_schema = FFI_ArrowSchema::empty();
            let status = dbe_cursor_arrow_record_batch(cursor, &mut out_array, &mut out_schema);
            assert_eq!(status, DBE_ERROR);

            dbe_cursor_free(cursor);
            assert!(!dbe_engine_is_closed(engine));
            dbe_engine_close(engine);
        }
    }

    #[test]
    fn test_c_surface_error_reporting() {
        let engine = dbe_engine_open();

        unsafe {
            let sql = CString::new("SELECT * FROM missing").unwrap();
            let cursor = dbe_engine_execute_dml(engine, sql.as_ptr());
            assert!(cursor.is_null());

            let err = dbe_last_error();
            assert!(!err.is_null());
            let msg = CStr::from_ptr(err).to_str().unwrap();
            assert!(msg.contains("missing"));

            dbe_engine_close(engine);
        }
    }

    #[test]
    fn test_null_handles_are_harmless() {
        unsafe {
            assert!(!dbe_engine_is_closed(ptr::null()));
            assert_eq!(dbe_cursor_row_count(ptr::null()), 0);
            dbe_engine_close(ptr::null_mut());
            dbe_cursor_free(ptr::null_mut());

            let cursor = dbe_engine_execute_dml(ptr::null(), ptr::null());
            assert!(cursor.is_null());
        }
    }
}
