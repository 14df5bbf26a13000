use tickos::{SystemConfiguration, SystemConfigurationBuilder, TestCase};

fn run(case: &'static dyn TestCase) -> bool {
    run_with(case, &SystemConfigurationBuilder::new().quiet(true).build())
}

fn run_with(case: &'static dyn TestCase, config: &SystemConfiguration) -> bool {
    case.run(config)
}

macro_rules! grade {
    ($($module:ident => [$($case:ident),* $(,)?]),* $(,)?) => {
        $(
            mod $module {
                $(
                    #[test]
                    fn $case() {
                        assert!(super::run(&threads_grader::$module::$case));
                    }
                )*
            }
        )*
    };
}

grade! {
    alarm => [
        wake_order,
        deadline_bound,
        zero_wait,
        negative_wait,
        same_deadline,
        staggered_deadlines,
        blocking_leaves_cpu,
        single_install,
    ],
    condition_variable => [
        sleep_reacquires_lock,
        sleep_restores_interrupt_state,
        wake_all_in_order,
        wake_without_waiters,
        sleep_without_lock,
        wake_without_lock,
        sleeper_is_parked,
        bounded_buffer,
    ],
    rendezvous => [single_pair, many_to_many, fifo_pairing],
    reaction => [water, reaction_is_logged, none_before_group, reaction_counts],
}

#[test]
fn jittered_timer() {
    let config = SystemConfigurationBuilder::new()
        .randomize_timer(0x5eed)
        .quiet(true)
        .build();
    assert!(run_with(&threads_grader::alarm::deadline_bound, &config));
    assert!(run_with(&threads_grader::alarm::zero_wait, &config));
    assert!(run_with(&threads_grader::alarm::staggered_deadlines, &config));
    assert!(run_with(&threads_grader::rendezvous::many_to_many, &config));
    assert!(run_with(&threads_grader::reaction::reaction_counts, &config));
}
