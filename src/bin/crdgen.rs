use aws_operator::crd::AWSConfig;
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&AWSConfig::crd())?);
    Ok(())
}
