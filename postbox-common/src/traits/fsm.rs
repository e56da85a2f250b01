/// A protocol conversation driven one input at a time.
///
/// Each state is a plain value; side effects such as the reply to send are
/// recorded in the `Context` rather than returned.
pub trait FiniteStateMachine {
    type Input;
    type Context;

    /// Consume one input and yield the state the conversation moves to.
    #[must_use]
    fn transition(self, input: Self::Input, context: &mut Self::Context) -> Self;

    /// True once no further input will be accepted.
    #[must_use]
    fn is_final(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    enum Door {
        Closed,
        Open,
        Gone,
    }

    impl FiniteStateMachine for Door {
        type Input = &'static str;
        type Context = Vec<&'static str>;

        fn transition(self, input: &'static str, log: &mut Vec<&'static str>) -> Self {
            log.push(input);
            match (self, input) {
                (Self::Closed, "open") => Self::Open,
                (Self::Open, "close") => Self::Closed,
                (_, "leave") => Self::Gone,
                (state, _) => state,
            }
        }

        fn is_final(&self) -> bool {
            *self == Self::Gone
        }
    }

    #[test]
    fn inputs_drive_state_and_context() {
        let mut log = Vec::new();
        let mut door = Door::Closed;

        for input in ["knock", "open", "close", "leave", "open"] {
            if door.is_final() {
                break;
            }
            door = door.transition(input, &mut log);
        }

        assert_eq!(door, Door::Gone);
        assert_eq!(log, ["knock", "open", "close", "leave"]);
    }
}
