use object::FixedArray;

use crate::frame::FramePointer;

/// Copy actual arguments `start_index .. start_index + count` of `frame`
/// into slots `0 .. count` of `destination`, lowest index first.
///
/// No write barrier: `destination` is fresh young memory.
///
/// # Safety
///
/// `frame` must be live and hold `argument_count` arguments.
#[inline]
pub unsafe fn copy_arguments(
    frame: FramePointer,
    argument_count: usize,
    destination: &mut FixedArray,
    start_index: usize,
    count: usize,
) {
    assert!(start_index + count <= argument_count);
    assert!(count <= destination.len());

    // SAFETY: the range is within the frame by the assertion above
    let source = unsafe { frame.arguments(start_index, count) };
    for (slot, argument) in destination.elements_mut().iter_mut().zip(source) {
        *slot = *argument;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object::{ObjectType, Value, init_fixed_array};
    use std::ptr::NonNull;

    #[test]
    fn copies_the_requested_window() {
        let mut args: Vec<Value> = (0..5).map(|i| Value::from_i64(i * 10)).collect();
        let frame = FramePointer::new(NonNull::new(args.as_mut_ptr()).unwrap());

        let mut words = vec![0u64; 3 + 3];
        let array = words.as_mut_ptr() as *mut FixedArray;
        unsafe {
            init_fixed_array(array, ObjectType::FixedArray, Value::zero(), 3);
            copy_arguments(frame, args.len(), &mut *array, 2, 3);
            assert_eq!(
                (*array).elements(),
                &[Value::from_i64(20), Value::from_i64(30), Value::from_i64(40)]
            );
        }
    }

    #[test]
    #[should_panic]
    fn rejects_reads_past_the_frame() {
        let mut args = vec![Value::from_i64(1)];
        let frame = FramePointer::new(NonNull::new(args.as_mut_ptr()).unwrap());
        let mut words = vec![0u64; 3 + 2];
        let array = words.as_mut_ptr() as *mut FixedArray;
        unsafe {
            init_fixed_array(array, ObjectType::FixedArray, Value::zero(), 2);
            copy_arguments(frame, 1, &mut *array, 0, 2);
        }
    }
}
