//! Pairs and tuples.
//!
//! Returned from a native call, a tuple spreads into one result per element.
//! Anywhere else (nested in a container, or pulled as an argument) it is a
//! sequence table read positionally.

use lualite_core::{ConversionError, NativeError, TableRef, Value};

use super::{FromValue, IntoValue, Marshal, mismatch};

macro_rules! impl_tuple {
    ($($T:ident $index:tt),+) => {
        impl<$($T: FromValue),+> FromValue for ($($T,)+) {
            fn from_value(value: &Value, cx: &mut Marshal<'_>) -> Result<Self, ConversionError> {
                let Value::Table(table) = value else {
                    return Err(mismatch("table", value));
                };
                Ok(($(
                    $T::from_value(&table.get_index($index + 1), cx)?,
                )+))
            }
        }

        impl<$($T: IntoValue),+> IntoValue for ($($T,)+) {
            fn into_value(self, cx: &mut Marshal<'_>) -> Result<Value, NativeError> {
                let values = vec![$(self.$index.into_value(cx)?),+];
                Ok(Value::Table(TableRef::from_sequence(values)))
            }

            fn push_results(self, cx: &mut Marshal<'_>, results: &mut Vec<Value>) -> Result<(), NativeError> {
                $(results.push(self.$index.into_value(cx)?);)+
                Ok(())
            }
        }
    };
}

impl_tuple!(A 0, B 1);
impl_tuple!(A 0, B 1, C 2);
impl_tuple!(A 0, B 1, C 2, D 3);
impl_tuple!(A 0, B 1, C 2, D 3, E 4);
impl_tuple!(A 0, B 1, C 2, D 3, E 4, F 5);
impl_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_tuple!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);
