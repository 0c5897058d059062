use argus::config::Settings;
use argus::scenario::select_scenarios;

use crate::FilterArgs;

pub(crate) fn run_list(settings: &Settings, args: &FilterArgs) {
    for (name, scenario) in select_scenarios(settings, &args.filter()) {
        let os_type = settings
            .images
            .get(&scenario.image)
            .map_or("-", |image| image.os_type.as_str());
        let suites: Vec<_> = scenario
            .test_classes
            .iter()
            .map(|suite| suite.name())
            .collect();
        println!(
            "{name}\timage={} os={os_type} type={} recipe={} suites={}",
            scenario.image,
            scenario.scenario_type.as_deref().unwrap_or("-"),
            scenario.recipe,
            suites.join(",")
        );
    }
}
