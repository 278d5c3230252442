//! Host -> script value encoding
//!
//! Host data is first serialized into a `serde_json::Value` document, then the
//! document is walked into engine values. Composite objects get their callable
//! members bound afterwards, since the document has no notion of functions.

use crate::binding::{bind_method, HostClass, Methods};
use crate::error::Result;
use crate::naming::Member;
use crate::session::SessionLink;
use rquickjs::{Array, Ctx, Object, Value};
use serde::ser::{self, Impossible};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

/// Encode any serializable host value.
///
/// A value serde cannot represent is reported as an unsupported type and
/// encoded as `undefined`; callers must tolerate that placeholder.
pub fn to_script<'js, T>(ctx: &Ctx<'js>, value: &T) -> Result<Value<'js>>
where
    T: Serialize + ?Sized,
{
    match serde_json::to_value(value) {
        // JSON has no Infinity or NaN; a bare float that came out as null
        // is encoded from the float itself.
        Ok(serde_json::Value::Null) => match value.serialize(BareFloat) {
            Ok(Some(number)) => Ok(Value::new_number(ctx.clone(), number)),
            _ => Ok(Value::new_null(ctx.clone())),
        },
        Ok(document) => document_to_script(ctx, &document),
        Err(err) => {
            tracing::warn!(
                host_type = std::any::type_name::<T>(),
                error = %err,
                "unsupported type, encoding as undefined"
            );
            Ok(Value::new_undefined(ctx.clone()))
        }
    }
}

/// Walk a JSON document into engine values.
pub fn document_to_script<'js>(ctx: &Ctx<'js>, document: &serde_json::Value) -> Result<Value<'js>> {
    use serde_json::Value as Doc;

    let value = match document {
        Doc::Null => Value::new_null(ctx.clone()),
        Doc::Bool(flag) => Value::new_bool(ctx.clone(), *flag),
        Doc::Number(number) => match number.as_f64() {
            Some(number) => Value::new_number(ctx.clone(), number),
            None => {
                tracing::warn!(%number, "unsupported number, encoding as undefined");
                Value::new_undefined(ctx.clone())
            }
        },
        Doc::String(text) => rquickjs::String::from_str(ctx.clone(), text)?.into_value(),
        Doc::Array(items) => {
            let array = Array::new(ctx.clone())?;
            for (index, item) in items.iter().enumerate() {
                // The array takes over the element's reference
                array.set(index, document_to_script(ctx, item)?)?;
            }
            array.into_value()
        }
        Doc::Object(fields) => {
            let object = Object::new(ctx.clone())?;
            set_fields(ctx, &object, fields)?;
            object.into_value()
        }
    };
    Ok(value)
}

/// Encode a composite host object together with its callable members.
///
/// Data members come from the serialized form (a unit struct yields an empty
/// object); the instance then moves into a shared receiver that every bound
/// method closes over.
pub fn instance_to_script<'js, T: HostClass>(
    ctx: &Ctx<'js>,
    link: &SessionLink,
    instance: T,
    methods: &Methods<T>,
) -> Result<Value<'js>> {
    let object = Object::new(ctx.clone())?;

    match serde_json::to_value(&instance) {
        Ok(serde_json::Value::Object(fields)) => set_fields(ctx, &object, &fields)?,
        Ok(serde_json::Value::Null) => {}
        Ok(other) => tracing::warn!(
            host_type = T::NAME,
            shape = %other,
            "composite did not serialize to an object, data members skipped"
        ),
        Err(err) => tracing::warn!(
            host_type = T::NAME,
            error = %err,
            "unsupported type, data members skipped"
        ),
    }

    let receiver = Rc::new(RefCell::new(instance));
    for binding in methods.iter() {
        let function = bind_method(ctx, link, binding.clone(), receiver.clone())?;
        tracing::trace!(host_type = T::NAME, member = binding.member().resolved(), "bound method");
        object.set(binding.member().resolved(), function)?;
    }

    Ok(object.into_value())
}

/// Extracts the float out of an `f32`/`f64`, possibly wrapped in `Some` or a
/// newtype. Anything else yields `None` (scalars) or an error (compounds).
struct BareFloat;

macro_rules! not_a_float {
    ($($method:ident($($arg:ty),*)),* $(,)?) => {
        $(
            fn $method(self, $(_: $arg),*) -> std::result::Result<Self::Ok, Self::Error> {
                Ok(None)
            }
        )*
    };
}

macro_rules! compound {
    ($($method:ident($($arg:ty),*) -> $kind:ident),* $(,)?) => {
        $(
            fn $method(self, $(_: $arg),*) -> std::result::Result<Self::$kind, Self::Error> {
                Err(ser::Error::custom("not a float"))
            }
        )*
    };
}

impl ser::Serializer for BareFloat {
    type Ok = Option<f64>;
    type Error = serde_json::Error;
    type SerializeSeq = Impossible<Option<f64>, serde_json::Error>;
    type SerializeTuple = Impossible<Option<f64>, serde_json::Error>;
    type SerializeTupleStruct = Impossible<Option<f64>, serde_json::Error>;
    type SerializeTupleVariant = Impossible<Option<f64>, serde_json::Error>;
    type SerializeMap = Impossible<Option<f64>, serde_json::Error>;
    type SerializeStruct = Impossible<Option<f64>, serde_json::Error>;
    type SerializeStructVariant = Impossible<Option<f64>, serde_json::Error>;

    fn serialize_f32(self, v: f32) -> std::result::Result<Self::Ok, Self::Error> {
        Ok(Some(f64::from(v)))
    }

    fn serialize_f64(self, v: f64) -> std::result::Result<Self::Ok, Self::Error> {
        Ok(Some(v))
    }

    fn serialize_some<T: ?Sized + Serialize>(
        self,
        value: &T,
    ) -> std::result::Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> std::result::Result<Self::Ok, Self::Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> std::result::Result<Self::Ok, Self::Error> {
        Ok(None)
    }

    not_a_float! {
        serialize_bool(bool),
        serialize_i8(i8),
        serialize_i16(i16),
        serialize_i32(i32),
        serialize_i64(i64),
        serialize_u8(u8),
        serialize_u16(u16),
        serialize_u32(u32),
        serialize_u64(u64),
        serialize_char(char),
        serialize_str(&str),
        serialize_bytes(&[u8]),
        serialize_none(),
        serialize_unit(),
        serialize_unit_struct(&'static str),
        serialize_unit_variant(&'static str, u32, &'static str),
    }

    compound! {
        serialize_seq(Option<usize>) -> SerializeSeq,
        serialize_tuple(usize) -> SerializeTuple,
        serialize_tuple_struct(&'static str, usize) -> SerializeTupleStruct,
        serialize_tuple_variant(&'static str, u32, &'static str, usize) -> SerializeTupleVariant,
        serialize_map(Option<usize>) -> SerializeMap,
        serialize_struct(&'static str, usize) -> SerializeStruct,
        serialize_struct_variant(&'static str, u32, &'static str, usize) -> SerializeStructVariant,
    }
}

fn set_fields<'js>(
    ctx: &Ctx<'js>,
    object: &Object<'js>,
    fields: &serde_json::Map<String, serde_json::Value>,
) -> Result<()> {
    for (key, field) in fields {
        let member = Member::data(key.clone());
        object.set(member.resolved(), document_to_script(ctx, field)?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ScriptKind;
    use serde::Serialize;
    use std::collections::HashMap;

    fn with_ctx(f: impl FnOnce(Ctx<'_>)) {
        let rt = rquickjs::Runtime::new().unwrap();
        let context = rquickjs::Context::full(&rt).unwrap();
        context.with(f);
    }

    #[derive(Serialize)]
    struct Track {
        #[serde(rename = "title")]
        name: String,
        plays: u32,
        tags: Vec<&'static str>,
        rating: Option<f64>,
    }

    #[test]
    fn test_primitives() {
        with_ctx(|ctx| {
            assert_eq!(to_script(&ctx, &true).unwrap().as_bool(), Some(true));
            assert_eq!(to_script(&ctx, &5).unwrap().get::<i32>().unwrap(), 5);
            assert_eq!(to_script(&ctx, &5.6).unwrap().get::<f64>().unwrap(), 5.6);
            assert_eq!(
                to_script(&ctx, "Hello World").unwrap().get::<String>().unwrap(),
                "Hello World"
            );
            assert!(to_script(&ctx, &Option::<i32>::None).unwrap().is_null());
        });
    }

    #[test]
    fn test_collection_keeps_order_and_length() {
        with_ctx(|ctx| {
            let value = to_script(&ctx, &vec![8, 3, 5]).unwrap();
            let array = value.as_array().unwrap();
            assert_eq!(array.len(), 3);
            assert_eq!(array.get::<i32>(0).unwrap(), 8);
            assert_eq!(array.get::<i32>(2).unwrap(), 5);
        });
    }

    #[test]
    fn test_composite_uses_serialized_names() {
        with_ctx(|ctx| {
            let track = Track {
                name: "Intro".to_string(),
                plays: 3,
                tags: vec!["a", "b"],
                rating: None,
            };
            let value = to_script(&ctx, &track).unwrap();
            let object = value.as_object().unwrap();
            assert_eq!(object.get::<_, String>("title").unwrap(), "Intro");
            assert!(object.get::<_, Value>("name").unwrap().is_undefined());
            assert_eq!(object.get::<_, u32>("plays").unwrap(), 3);
            assert!(object.get::<_, Value>("rating").unwrap().is_null());
            assert_eq!(object.get::<_, Vec<String>>("tags").unwrap(), vec!["a", "b"]);
        });
    }

    #[test]
    fn test_non_finite_floats_stay_numbers() {
        with_ctx(|ctx| {
            let infinity = to_script(&ctx, &f64::INFINITY).unwrap();
            assert_eq!(infinity.get::<f64>().unwrap(), f64::INFINITY);

            let negative = to_script(&ctx, &Some(f32::NEG_INFINITY)).unwrap();
            assert_eq!(negative.get::<f64>().unwrap(), f64::NEG_INFINITY);

            let nan = to_script(&ctx, &f64::NAN).unwrap();
            assert_eq!(ScriptKind::of(&nan), ScriptKind::Number);
            assert!(nan.get::<f64>().unwrap().is_nan());

            // Real nulls are untouched
            assert!(to_script(&ctx, &()).unwrap().is_null());
            assert!(to_script(&ctx, &Option::<f64>::None).unwrap().is_null());
        });
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_unsupported_type_degrades_to_undefined() {
        with_ctx(|ctx| {
            // JSON objects need string keys
            let mut grid = HashMap::new();
            grid.insert((1, 2), "cell");
            let value = to_script(&ctx, &grid).unwrap();
            assert!(value.is_undefined());
        });
        assert!(logs_contain("unsupported type"));
    }
}
