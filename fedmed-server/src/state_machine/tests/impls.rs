use crate::state_machine::{
    phases::{self, PhaseState},
    tests::utils::TestCohort,
    StateMachine,
};

impl StateMachine<TestCohort> {
    pub fn is_idle(&self) -> bool {
        match self {
            StateMachine::Idle(_) => true,
            _ => false,
        }
    }

    pub fn is_collect(&self) -> bool {
        match self {
            StateMachine::Collect(_) => true,
            _ => false,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        match self {
            StateMachine::Aggregate(_) => true,
            _ => false,
        }
    }

    pub fn into_aggregate_phase_state(self) -> PhaseState<phases::Aggregate, TestCohort> {
        match self {
            StateMachine::Aggregate(state) => state,
            _ => panic!("not in aggregate state"),
        }
    }

    pub fn is_evaluate(&self) -> bool {
        match self {
            StateMachine::Evaluate(_) => true,
            _ => false,
        }
    }

    pub fn is_publish(&self) -> bool {
        match self {
            StateMachine::Publish(_) => true,
            _ => false,
        }
    }

    pub fn is_failure(&self) -> bool {
        match self {
            StateMachine::Failure(_) => true,
            _ => false,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        match self {
            StateMachine::Shutdown(_) => true,
            _ => false,
        }
    }
}
