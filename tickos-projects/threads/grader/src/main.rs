use tickos::{SystemConfigurationBuilder, TestDriver};
use threads_grader::{alarm, condition_variable, reaction, rendezvous};

fn main() {
    let config = SystemConfigurationBuilder::from_env().build();
    let passed = TestDriver::start(
        &config,
        [
            &alarm::wake_order,
            &alarm::deadline_bound,
            &alarm::zero_wait,
            &alarm::negative_wait,
            &alarm::same_deadline,
            &alarm::staggered_deadlines,
            &alarm::blocking_leaves_cpu,
            &alarm::single_install,
            &condition_variable::sleep_reacquires_lock,
            &condition_variable::sleep_restores_interrupt_state,
            &condition_variable::wake_all_in_order,
            &condition_variable::wake_without_waiters,
            &condition_variable::sleep_without_lock,
            &condition_variable::wake_without_lock,
            &condition_variable::sleeper_is_parked,
            &condition_variable::bounded_buffer,
            &rendezvous::single_pair,
            &rendezvous::many_to_many,
            &rendezvous::fifo_pairing,
            &reaction::water,
            &reaction::reaction_is_logged,
            &reaction::none_before_group,
            &reaction::reaction_counts,
        ],
    );
    if !passed {
        std::process::exit(1);
    }
}
